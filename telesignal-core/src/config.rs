use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub signaling: SignalingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Room lifecycle and signaling diagnostics
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalingConfig {
    /// Room lifetime after the first participant leaves
    pub expire_after_first_leave_secs: u64,
    /// Room lifetime once nobody is connected
    pub expire_after_empty_secs: u64,
    /// Age after which a pending offer/answer is reported as stale
    pub stale_signal_warn_secs: u64,
    /// Age after which an ICE candidate is reported as stale
    pub stale_candidate_warn_secs: u64,
    /// Rooms with no connected participant, no armed timer and no activity
    /// for this long are swept. 0 disables the sweep.
    pub idle_room_ttl_secs: u64,
    /// How often the idle-room sweep runs
    pub idle_sweep_interval_secs: u64,
}

impl Default for SignalingConfig {
    fn default() -> Self {
        Self {
            expire_after_first_leave_secs: 15 * 60,
            expire_after_empty_secs: 5 * 60,
            stale_signal_warn_secs: 30,
            stale_candidate_warn_secs: 60,
            idle_room_ttl_secs: 4 * 60 * 60,
            idle_sweep_interval_secs: 5 * 60,
        }
    }
}

impl SignalingConfig {
    #[must_use]
    pub const fn expire_after_first_leave(&self) -> Duration {
        Duration::from_secs(self.expire_after_first_leave_secs)
    }

    #[must_use]
    pub const fn expire_after_empty(&self) -> Duration {
        Duration::from_secs(self.expire_after_empty_secs)
    }

    #[must_use]
    pub const fn stale_signal_warn(&self) -> Duration {
        Duration::from_secs(self.stale_signal_warn_secs)
    }

    #[must_use]
    pub const fn stale_candidate_warn(&self) -> Duration {
        Duration::from_secs(self.stale_candidate_warn_secs)
    }

    /// `None` when the idle sweep is disabled
    #[must_use]
    pub const fn idle_room_ttl(&self) -> Option<Duration> {
        if self.idle_room_ttl_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_room_ttl_secs))
        }
    }

    #[must_use]
    pub const fn idle_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.idle_sweep_interval_secs)
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if Path::new(path).exists() {
                builder = builder.add_source(File::with_name(path));
            }
        }

        // TELESIGNAL_SERVER__HTTP_PORT, TELESIGNAL_SIGNALING__EXPIRE_AFTER_EMPTY_SECS, ...
        builder = builder.add_source(
            Environment::with_prefix("TELESIGNAL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only (for Docker/K8s)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Get HTTP address
    #[must_use]
    pub fn http_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.http_port)
    }

    /// Check for misconfigurations, collecting every problem found
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.server.http_port == 0 {
            errors.push("server.http_port must be non-zero".to_string());
        }
        if crate::logging::parse_log_level(&self.logging.level).is_err() {
            errors.push(format!("logging.level '{}' is not a valid level", self.logging.level));
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            errors.push(format!(
                "logging.format '{}' must be 'json' or 'pretty'",
                self.logging.format
            ));
        }

        let signaling = &self.signaling;
        if signaling.expire_after_first_leave_secs == 0 {
            errors.push("signaling.expire_after_first_leave_secs must be non-zero".to_string());
        }
        if signaling.expire_after_empty_secs == 0 {
            errors.push("signaling.expire_after_empty_secs must be non-zero".to_string());
        }
        if signaling.idle_room_ttl_secs > 0 && signaling.idle_sweep_interval_secs == 0 {
            errors.push(
                "signaling.idle_sweep_interval_secs must be non-zero when the idle sweep is enabled"
                    .to_string(),
            );
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.http_address(), "0.0.0.0:8080");
        assert_eq!(config.signaling.expire_after_first_leave(), Duration::from_secs(900));
        assert_eq!(config.signaling.expire_after_empty(), Duration::from_secs(300));
        assert_eq!(config.signaling.stale_signal_warn(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_idle_sweep_disabled_by_zero_ttl() {
        let signaling = SignalingConfig {
            idle_room_ttl_secs: 0,
            idle_sweep_interval_secs: 0,
            ..SignalingConfig::default()
        };
        assert!(signaling.idle_room_ttl().is_none());

        let config = Config {
            signaling,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_collects_all_errors() {
        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                http_port: 0,
            },
            logging: LoggingConfig {
                level: "loud".to_string(),
                format: "xml".to_string(),
                file_path: None,
            },
            signaling: SignalingConfig {
                expire_after_empty_secs: 0,
                idle_sweep_interval_secs: 0,
                ..SignalingConfig::default()
            },
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.iter().any(|e| e.contains("http_port")));
        assert!(errors.iter().any(|e| e.contains("expire_after_empty_secs")));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::from_file("/nonexistent/telesignal.yaml").unwrap();
        assert_eq!(config.server.http_port, 8080);
    }
}
