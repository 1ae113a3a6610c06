//! Message admission service.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{Result, SmsGuardError};
use crate::ratelimit::RateLimiterBackend;

/// Response text for an admitted message.
pub const MESSAGE_SENT_SUCCESS: &str = "Message sent successfully.";
/// Response text for a rate-limited message.
pub const RATE_LIMIT_EXCEEDED: &str = "Message sending restricted due to rate limits.";

/// An outbound SMS request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmsRequest {
    /// Phone number of the sender
    pub sender_phone_number: String,
    /// Phone number of the receiver
    pub receiver_phone_number: String,
    /// Message body
    pub message: String,
}

impl SmsRequest {
    /// Create a request.
    pub fn new(
        sender_phone_number: impl Into<String>,
        receiver_phone_number: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            sender_phone_number: sender_phone_number.into(),
            receiver_phone_number: receiver_phone_number.into(),
            message: message.into(),
        }
    }

    /// Check that every field is present.
    pub fn validate(&self) -> Result<()> {
        if self.sender_phone_number.trim().is_empty() {
            return Err(SmsGuardError::Validation(
                "Sender phone number is required.".to_string(),
            ));
        }
        if self.receiver_phone_number.trim().is_empty() {
            return Err(SmsGuardError::Validation(
                "Receiver phone number is required.".to_string(),
            ));
        }
        if self.message.trim().is_empty() {
            return Err(SmsGuardError::Validation(
                "Message content is required.".to_string(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a send attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    /// Whether the message was admitted
    pub success: bool,
    /// Human readable outcome
    pub message: String,
}

impl MessageResponse {
    /// An admitted message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    /// A rejected message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Gates message sends on the global and per-sender limits.
pub struct MessageService<R: RateLimiterBackend> {
    rate_limiter: Arc<R>,
}

impl<R: RateLimiterBackend> MessageService<R> {
    /// Create a service over `rate_limiter`.
    pub fn new(rate_limiter: Arc<R>) -> Self {
        Self { rate_limiter }
    }

    /// Whether `request` may be sent now.
    ///
    /// The global check runs first; a globally rejected request does not
    /// consume the sender's quota.
    pub async fn can_send_message(&self, request: &SmsRequest) -> Result<bool> {
        if !self.rate_limiter.can_send_global().await? {
            return Ok(false);
        }
        self.rate_limiter
            .can_send(&request.sender_phone_number)
            .await
    }

    /// Validate and admit `request`.
    #[instrument(skip(self, request), fields(sender = %request.sender_phone_number))]
    pub async fn send_message(&self, request: &SmsRequest) -> Result<MessageResponse> {
        if let Err(e) = request.validate() {
            warn!(error = %e, "Rejected invalid message request");
            return Err(e);
        }

        let response = if self.can_send_message(request).await? {
            MessageResponse::success(MESSAGE_SENT_SUCCESS)
        } else {
            MessageResponse::failure(RATE_LIMIT_EXCEEDED)
        };

        info!(success = response.success, "Message decision made");
        Ok(response)
    }
}
