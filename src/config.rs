//! Configuration management for SmsGuard.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::Result;
use crate::ratelimit::RateLimitConfig;

/// Main configuration for the SmsGuard service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Rate limit configuration
    #[serde(default)]
    pub rate_limits: RateLimitSettings,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Cleanup sweep configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Rate limit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Messages a single sender may send per second
    #[serde(default = "default_max_per_sender")]
    pub max_messages_per_sender_per_sec: u64,

    /// Messages the whole system may send per second
    #[serde(default = "default_max_global")]
    pub max_messages_global_per_sec: u64,

    /// Trailing window used for usage percentages
    #[serde(default = "default_metrics_window")]
    pub metrics_window_seconds: u64,

    /// How long an admission counter lives after its first write
    #[serde(default = "default_counter_ttl")]
    pub counter_ttl_seconds: u64,

    /// Prefix of every counter key
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            max_messages_per_sender_per_sec: default_max_per_sender(),
            max_messages_global_per_sec: default_max_global(),
            metrics_window_seconds: default_metrics_window(),
            counter_ttl_seconds: default_counter_ttl(),
            key_prefix: default_key_prefix(),
        }
    }
}

fn default_max_per_sender() -> u64 {
    10
}

fn default_max_global() -> u64 {
    100
}

fn default_metrics_window() -> u64 {
    10
}

fn default_counter_ttl() -> u64 {
    1
}

fn default_key_prefix() -> String {
    "rate_limit".to_string()
}

/// Which counter store implementation to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Process-local store, for single instances and development
    #[default]
    Memory,
    /// Shared Redis store
    Redis,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store implementation
    #[serde(default)]
    pub backend: StoreBackend,

    /// Redis connection URL
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Deadline for a single store call in milliseconds
    #[serde(default = "default_store_timeout")]
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            redis_url: default_redis_url(),
            timeout_ms: default_store_timeout(),
        }
    }
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_store_timeout() -> u64 {
    2000
}

/// Cleanup sweep configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Seconds between sweeps
    #[serde(default = "default_cleanup_interval")]
    pub interval_secs: u64,

    /// Keys inactive for longer than this are deleted
    #[serde(default = "default_inactivity_threshold")]
    pub inactivity_threshold_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_cleanup_interval(),
            inactivity_threshold_secs: default_inactivity_threshold(),
        }
    }
}

impl CleanupConfig {
    /// Time between sweeps.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Inactivity threshold for the sweep.
    pub fn inactivity_threshold(&self) -> Duration {
        Duration::from_secs(self.inactivity_threshold_secs)
    }
}

fn default_cleanup_interval() -> u64 {
    60
}

fn default_inactivity_threshold() -> u64 {
    300
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable
    #[default]
    Pretty,
    /// One JSON object per line
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    /// Load configuration from defaults, an optional file, and `SMSGUARD__*`
    /// environment variables, in increasing precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(File::from(path));
        }

        let config = builder
            .add_source(
                Environment::with_prefix("SMSGUARD")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// The validated engine configuration.
    pub fn rate_limit_config(&self) -> Result<RateLimitConfig> {
        let settings = &self.rate_limits;
        let config = RateLimitConfig {
            max_per_sender_per_window: settings.max_messages_per_sender_per_sec,
            max_global_per_window: settings.max_messages_global_per_sec,
            metrics_window_seconds: settings.metrics_window_seconds,
            counter_ttl: Duration::from_secs(settings.counter_ttl_seconds),
            key_prefix: settings.key_prefix.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SmsGuardError;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.rate_limits.max_messages_per_sender_per_sec, 10);
        assert_eq!(config.rate_limits.max_messages_global_per_sec, 100);
        assert_eq!(config.rate_limits.metrics_window_seconds, 10);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.store.timeout_ms, 2000);
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
rate_limits:
  max_messages_per_sender_per_sec: 5
store:
  backend: redis
  redis_url: redis://cache:6379
logging:
  format: json
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.rate_limits.max_messages_per_sender_per_sec, 5);
        assert_eq!(config.rate_limits.max_messages_global_per_sec, 100);
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.redis_url, "redis://cache:6379");
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.cleanup.interval(), Duration::from_secs(60));
    }

    #[test]
    fn test_rate_limit_config_conversion() {
        let config = AppConfig::default().rate_limit_config().unwrap();
        assert_eq!(config.max_per_sender_per_window, 10);
        assert_eq!(config.max_global_per_window, 100);
        assert_eq!(config.counter_ttl, Duration::from_secs(1));
        assert_eq!(config.key_prefix, "rate_limit");
    }

    #[test]
    fn test_zero_limit_rejected() {
        let yaml = r#"
rate_limits:
  max_messages_global_per_sec: 0
"#;
        let config = AppConfig::from_yaml(yaml).unwrap();
        assert!(matches!(
            config.rate_limit_config(),
            Err(SmsGuardError::Config(_))
        ));
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.rate_limits.key_prefix, "rate_limit");
        assert_eq!(config.cleanup.inactivity_threshold_secs, 300);
    }
}
