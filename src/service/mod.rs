//! Caller-facing services built on the rate limiter.

mod health;
mod message;

pub use health::{HealthChecker, HealthStatus};
pub use message::{
    MessageResponse, MessageService, SmsRequest, MESSAGE_SENT_SUCCESS, RATE_LIMIT_EXCEEDED,
};
