//! Prometheus metrics for room lifecycle, signaling and presence
//!
//! Everything is registered on a single registry exposed through
//! [`gather_metrics`] for the `/metrics` endpoint.

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, Encoder, IntCounter, IntCounterVec, IntGauge, Registry,
    TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// Rooms currently held in memory
pub static ROOMS_ACTIVE: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "telesignal_rooms_active",
        "Current number of rooms held in memory",
        REGISTRY.clone()
    )
    .expect("Failed to register ROOMS_ACTIVE")
});

/// Rooms lazily created by a join
pub static ROOMS_CREATED_TOTAL: std::sync::LazyLock<IntCounter> = std::sync::LazyLock::new(|| {
    register_int_counter_with_registry!(
        "telesignal_rooms_created_total",
        "Total number of rooms created",
        REGISTRY.clone()
    )
    .expect("Failed to register ROOMS_CREATED_TOTAL")
});

/// Room deletions, labeled by what triggered them
pub static ROOM_CLEANUPS_TOTAL: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            "telesignal_room_cleanups_total",
            "Total number of room cleanups",
            &["reason"],
            REGISTRY.clone()
        )
        .expect("Failed to register ROOM_CLEANUPS_TOTAL")
    });

/// Open presence subscriptions across all rooms
pub static PRESENCE_SUBSCRIBERS: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
    register_int_gauge_with_registry!(
        "telesignal_presence_subscribers",
        "Current number of open presence subscriptions",
        REGISTRY.clone()
    )
    .expect("Failed to register PRESENCE_SUBSCRIBERS")
});

/// Signaling writes, labeled by kind (offer, answer, ice_candidate)
pub static SIGNALING_MESSAGES_TOTAL: std::sync::LazyLock<IntCounterVec> =
    std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            "telesignal_signaling_messages_total",
            "Total number of signaling messages stored",
            &["kind"],
            REGISTRY.clone()
        )
        .expect("Failed to register SIGNALING_MESSAGES_TOTAL")
    });

/// Gather all metrics in Prometheus text format
pub fn gather_metrics() -> Result<String, prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|_| prometheus::Error::Msg("Invalid UTF-8".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        ROOMS_CREATED_TOTAL.inc();
        ROOM_CLEANUPS_TOTAL.with_label_values(&["manual"]).inc();
        SIGNALING_MESSAGES_TOTAL.with_label_values(&["offer"]).inc();
        ROOMS_ACTIVE.get();
        PRESENCE_SUBSCRIBERS.get();

        let output = gather_metrics().unwrap();
        assert!(output.contains("telesignal_rooms_created_total"));
        assert!(output.contains("telesignal_room_cleanups_total"));
        assert!(output.contains("telesignal_signaling_messages_total"));
    }
}
