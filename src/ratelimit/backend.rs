//! Admission trait consumed by the message service.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for admission and usage queries.
///
/// The message service depends on this seam rather than on [`RateLimiter`]
/// directly, so tests can substitute scripted decisions.
///
/// [`RateLimiter`]: super::RateLimiter
#[async_trait]
pub trait RateLimiterBackend: Send + Sync {
    /// Count one attempt for a sender and report whether it is within limits.
    async fn can_send(&self, sender_id: &str) -> Result<bool>;

    /// Count one attempt against the global limit.
    async fn can_send_global(&self) -> Result<bool>;

    /// Trailing-window usage of a sender, in percent.
    async fn get_sender_usage_percentage(&self, sender_id: &str) -> Result<i64>;

    /// Trailing-window global usage, in percent.
    async fn get_global_usage_percentage(&self) -> Result<i64>;
}
