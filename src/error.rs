//! Error types for the SmsGuard engine.

use std::time::Duration;
use thiserror::Error;

/// Main error type for SmsGuard operations.
#[derive(Error, Debug)]
pub enum SmsGuardError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Counter store errors that are not tied to a specific backend
    #[error("Counter store error: {0}")]
    Store(String),

    /// A counter store call did not complete in time
    #[error("Counter store operation `{operation}` timed out after {timeout:?}")]
    StoreTimeout {
        /// The store operation that timed out
        operation: &'static str,
        /// The configured limit
        timeout: Duration,
    },

    /// Redis errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Invalid message requests
    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<config::ConfigError> for SmsGuardError {
    fn from(err: config::ConfigError) -> Self {
        SmsGuardError::Config(err.to_string())
    }
}

impl From<serde_yaml::Error> for SmsGuardError {
    fn from(err: serde_yaml::Error) -> Self {
        SmsGuardError::Config(err.to_string())
    }
}

/// Result type alias for SmsGuard operations.
pub type Result<T> = std::result::Result<T, SmsGuardError>;
