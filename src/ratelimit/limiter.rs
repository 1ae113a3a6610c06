//! Core admission and usage engine.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, trace};

use super::window::{Scope, WindowKeys};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SmsGuardError};
use crate::store::CounterStore;

/// Default trailing window for usage percentages.
pub const DEFAULT_METRICS_WINDOW_SECONDS: u64 = 10;
/// Default lifetime of an admission counter: one bucket.
pub const DEFAULT_COUNTER_TTL: Duration = Duration::from_secs(1);
/// Default counter key prefix.
pub const DEFAULT_KEY_PREFIX: &str = "rate_limit";

/// Bucket reads kept in flight at once while summing a range.
pub(crate) const READ_CONCURRENCY: usize = 32;

/// Limits for a [`RateLimiter`], fixed for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Admissions allowed per sender per one-second bucket
    pub max_per_sender_per_window: u64,
    /// Admissions allowed system-wide per one-second bucket
    pub max_global_per_window: u64,
    /// Trailing window length, in buckets, for usage percentages
    pub metrics_window_seconds: u64,
    /// Expiry applied to a counter on its first write
    pub counter_ttl: Duration,
    /// Prefix of every counter key
    pub key_prefix: String,
}

impl RateLimitConfig {
    /// Create a configuration with the default window, TTL and prefix.
    pub fn new(max_per_sender_per_window: u64, max_global_per_window: u64) -> Self {
        Self {
            max_per_sender_per_window,
            max_global_per_window,
            metrics_window_seconds: DEFAULT_METRICS_WINDOW_SECONDS,
            counter_ttl: DEFAULT_COUNTER_TTL,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }

    /// Reject limits and windows that would make the percentage math undefined.
    pub fn validate(&self) -> Result<()> {
        if self.max_per_sender_per_window == 0 {
            return Err(SmsGuardError::Config(
                "max_per_sender_per_window must be > 0".to_string(),
            ));
        }
        if self.max_global_per_window == 0 {
            return Err(SmsGuardError::Config(
                "max_global_per_window must be > 0".to_string(),
            ));
        }
        if self.metrics_window_seconds == 0 {
            return Err(SmsGuardError::Config(
                "metrics_window_seconds must be > 0".to_string(),
            ));
        }
        if self.counter_ttl.is_zero() {
            return Err(SmsGuardError::Config("counter_ttl must be > 0".to_string()));
        }
        if self.key_prefix.is_empty() {
            return Err(SmsGuardError::Config(
                "key_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Stateless rate limiter over a shared [`CounterStore`].
///
/// All counts live in the store, so any number of instances may run against
/// the same store. Sender and global checks are independent calls and are not
/// evaluated atomically as a pair.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    keys: WindowKeys,
    config: RateLimitConfig,
}

impl RateLimiter {
    /// Create a rate limiter using the system clock.
    pub fn new(store: Arc<dyn CounterStore>, config: RateLimitConfig) -> Result<Self> {
        Self::with_clock(store, Arc::new(SystemClock), config)
    }

    /// Create a rate limiter driven by `clock`.
    pub fn with_clock(
        store: Arc<dyn CounterStore>,
        clock: Arc<dyn Clock>,
        config: RateLimitConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            clock,
            keys: WindowKeys::new(config.key_prefix.clone()),
            config,
        })
    }

    /// Count one attempt for `sender_id` in the current second.
    ///
    /// Returns `true` if the sender is still within its per-second limit.
    pub async fn can_send(&self, sender_id: &str) -> Result<bool> {
        self.admit(Scope::Sender(sender_id), self.config.max_per_sender_per_window)
            .await
    }

    /// Count one attempt against the global bucket for the current second.
    pub async fn can_send_global(&self) -> Result<bool> {
        self.admit(Scope::Global, self.config.max_global_per_window)
            .await
    }

    async fn admit(&self, scope: Scope<'_>, limit: u64) -> Result<bool> {
        let key = self.keys.bucket_key(&scope, self.clock.now());

        let allowed = self
            .store
            .increment_with_expiration(&key, limit, self.config.counter_ttl)
            .await?;

        trace!(key = %key, limit = limit, allowed = allowed, "Checked admission");
        if !allowed {
            debug!(scope = %scope, limit = limit, "Rate limit exceeded");
        }

        Ok(allowed)
    }

    /// Usage of `sender_id` over the trailing window, as a percentage.
    ///
    /// May exceed 100 during a burst.
    pub async fn get_sender_usage_percentage(&self, sender_id: &str) -> Result<i64> {
        self.usage_percentage(Scope::Sender(sender_id), self.config.max_per_sender_per_window)
            .await
    }

    /// Global usage over the trailing window, as a percentage.
    pub async fn get_global_usage_percentage(&self) -> Result<i64> {
        self.usage_percentage(Scope::Global, self.config.max_global_per_window)
            .await
    }

    async fn usage_percentage(&self, scope: Scope<'_>, limit: u64) -> Result<i64> {
        let window = self.config.metrics_window_seconds;
        let total = sum_buckets(
            self.store.as_ref(),
            trailing_window_keys(&self.keys, &scope, self.clock.now(), window),
        )
        .await?;

        let capacity = limit.saturating_mul(window);
        let percentage = total.saturating_mul(100) / capacity;

        trace!(scope = %scope, total = total, percentage = percentage, "Computed usage");
        Ok(i64::try_from(percentage).unwrap_or(i64::MAX))
    }

    /// Raw counter value for `key`, 0 if absent.
    pub async fn get_count_for_key(&self, key: &str) -> Result<u64> {
        self.store.get_count(key).await
    }

    /// Per-sender limit per bucket.
    pub fn max_messages_per_sender(&self) -> u64 {
        self.config.max_per_sender_per_window
    }

    /// Global limit per bucket.
    pub fn max_messages_global(&self) -> u64 {
        self.config.max_global_per_window
    }

    /// The engine configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// The key builder.
    pub fn keys(&self) -> &WindowKeys {
        &self.keys
    }

    /// The shared counter store.
    pub fn store(&self) -> &Arc<dyn CounterStore> {
        &self.store
    }

    /// The clock driving bucket selection.
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

#[async_trait]
impl super::backend::RateLimiterBackend for RateLimiter {
    async fn can_send(&self, sender_id: &str) -> Result<bool> {
        self.can_send(sender_id).await
    }

    async fn can_send_global(&self) -> Result<bool> {
        self.can_send_global().await
    }

    async fn get_sender_usage_percentage(&self, sender_id: &str) -> Result<i64> {
        self.get_sender_usage_percentage(sender_id).await
    }

    async fn get_global_usage_percentage(&self) -> Result<i64> {
        self.get_global_usage_percentage().await
    }
}

/// Keys of the `window` most recent buckets, ending with the one holding `now`.
fn trailing_window_keys(
    keys: &WindowKeys,
    scope: &Scope<'_>,
    now: DateTime<Utc>,
    window: u64,
) -> Vec<String> {
    (0..window)
        .filter_map(|back| {
            let offset = chrono::Duration::seconds(i64::try_from(back).ok()?);
            now.checked_sub_signed(offset)
        })
        .map(|at| keys.bucket_key(scope, at))
        .collect()
}

/// Sum the counts of `keys`, one store read per key.
///
/// Keys are pulled lazily, so at most [`READ_CONCURRENCY`] are alive at once.
pub(crate) async fn sum_buckets<I>(store: &dyn CounterStore, keys: I) -> Result<u64>
where
    I: IntoIterator<Item = String>,
{
    stream::iter(keys)
        .map(|key| async move { store.get_count(&key).await })
        .buffer_unordered(READ_CONCURRENCY)
        .try_fold(0u64, |total, count| async move {
            Ok::<_, SmsGuardError>(total.saturating_add(count))
        })
        .await
}
