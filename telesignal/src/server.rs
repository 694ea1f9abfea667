//! Server lifecycle management
//!
//! Manages the startup and shutdown of all server components:
//! - HTTP signaling server
//! - Idle-room sweeper

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use telesignal_api::http::{create_router, AppState, IdentityResolver};
use telesignal_core::{
    service::{PresenceBroadcaster, RoomStore, SessionManager, SignalingRelay},
    Config,
};

/// Container for shared services
#[derive(Clone)]
pub struct Services {
    pub store: Arc<RoomStore>,
    pub presence: Arc<PresenceBroadcaster>,
    pub sessions: SessionManager,
    pub relay: SignalingRelay,
    pub identity: Arc<dyn IdentityResolver>,
}

/// Telesignal server - manages all server components
pub struct TelesignalServer {
    config: Config,
    services: Services,
    sweeper_handle: Option<JoinHandle<()>>,
}

impl TelesignalServer {
    /// Create a new server instance
    pub const fn new(config: Config, services: Services) -> Self {
        Self {
            config,
            services,
            sweeper_handle: None,
        }
    }

    /// Start all components and wait for shutdown signal
    pub async fn start(mut self) -> anyhow::Result<()> {
        info!("Starting Telesignal server...");

        // Create shutdown signal channel
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // Start HTTP server with graceful shutdown
        let mut http_handle = self.start_http_server(shutdown_rx.clone());

        // Start idle-room sweeper
        self.sweeper_handle = self.start_idle_sweeper(shutdown_rx);

        info!("All servers started successfully");

        let http_stopped = tokio::select! {
            _ = &mut http_handle => {
                error!("HTTP server stopped unexpectedly");
                true
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, starting graceful shutdown...");
                false
            }
        };

        // Signal all components to shut down
        let _ = shutdown_tx.send(true);

        // Open presence streams never end on their own, so draining is bounded
        if !http_stopped {
            let drain_timeout = Duration::from_secs(10);
            if tokio::time::timeout(drain_timeout, &mut http_handle).await.is_err() {
                warn!(
                    "HTTP connections still open after {}s, closing them",
                    drain_timeout.as_secs()
                );
                http_handle.abort();
            }
        }

        self.shutdown().await;

        Ok(())
    }

    /// Gracefully shut down background components
    async fn shutdown(&mut self) {
        info!("Shutting down Telesignal server...");

        if let Some(handle) = self.sweeper_handle.take() {
            match tokio::time::timeout(Duration::from_secs(5), handle).await {
                Ok(_) => info!("Idle-room sweeper stopped"),
                Err(_) => warn!("Idle-room sweeper did not stop within 5s"),
            }
        }

        info!(
            rooms = self.services.store.len(),
            presence_rooms = self.services.presence.room_count(),
            "Dropping in-memory rooms"
        );
        info!("Telesignal server shut down");
    }

    /// Periodically delete rooms that no expiry timer will ever reap
    fn start_idle_sweeper(&self, shutdown_rx: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        let Some(ttl) = self.config.signaling.idle_room_ttl() else {
            info!("Idle-room sweep disabled");
            return None;
        };
        let period = self.config.signaling.idle_sweep_interval();
        let sessions = self.services.sessions.clone();

        info!(
            ttl_secs = ttl.as_secs(),
            interval_secs = period.as_secs(),
            "Idle-room sweeper started"
        );

        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            interval.tick().await;

            let mut rx = shutdown_rx;
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        sessions.sweep_idle_rooms();
                    }
                    _ = rx.changed() => {
                        break;
                    }
                }
            }
        }))
    }

    fn start_http_server(&self, shutdown_rx: watch::Receiver<bool>) -> JoinHandle<()> {
        let http_address = self.config.http_address();

        let http_router = create_router(AppState {
            sessions: self.services.sessions.clone(),
            relay: self.services.relay.clone(),
            presence: self.services.presence.clone(),
            identity: self.services.identity.clone(),
        });

        tokio::spawn(async move {
            let http_addr: std::net::SocketAddr = match http_address.parse() {
                Ok(addr) => addr,
                Err(e) => {
                    error!("Invalid HTTP address '{}': {}", http_address, e);
                    return;
                }
            };

            let listener = match tokio::net::TcpListener::bind(http_addr).await {
                Ok(listener) => listener,
                Err(e) => {
                    error!("Failed to bind HTTP address {}: {}", http_addr, e);
                    return;
                }
            };

            info!("HTTP server listening on {}", http_addr);

            let mut rx = shutdown_rx;
            let graceful = async move {
                let _ = rx.changed().await;
            };

            if let Err(e) = axum::serve(listener, http_router)
                .with_graceful_shutdown(graceful)
                .await
            {
                error!("HTTP server error: {}", e);
            }

            info!("HTTP server shut down gracefully");
        })
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C signal");
            }
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
                info!("Received SIGTERM signal");
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
