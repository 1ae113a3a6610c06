//! Per-call deadline for counter store operations.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::warn;

use super::CounterStore;
use crate::error::{Result, SmsGuardError};

/// Wraps a [`CounterStore`] so that every call fails with
/// [`SmsGuardError::StoreTimeout`] instead of blocking past `timeout`.
///
/// Decisions made before the deadline are passed through unchanged.
pub struct TimeoutStore<S> {
    inner: S,
    timeout: Duration,
}

impl<S: CounterStore> TimeoutStore<S> {
    /// Bound every call to `inner` by `timeout`.
    pub fn new(inner: S, timeout: Duration) -> Self {
        Self { inner, timeout }
    }

    /// The wrapped store.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    async fn guard<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = Result<T>> + Send,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    operation = operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Counter store call timed out"
                );
                Err(SmsGuardError::StoreTimeout {
                    operation,
                    timeout: self.timeout,
                })
            }
        }
    }
}

#[async_trait]
impl<S: CounterStore> CounterStore for TimeoutStore<S> {
    async fn increment_with_expiration(
        &self,
        key: &str,
        max_limit: u64,
        expiry: Duration,
    ) -> Result<bool> {
        self.guard(
            "increment_with_expiration",
            self.inner.increment_with_expiration(key, max_limit, expiry),
        )
        .await
    }

    async fn get_count(&self, key: &str) -> Result<u64> {
        self.guard("get_count", self.inner.get_count(key)).await
    }

    async fn get_keys(&self, pattern: &str) -> Result<Vec<String>> {
        self.guard("get_keys", self.inner.get_keys(pattern)).await
    }

    async fn get_last_access_time(&self, key: &str) -> Result<DateTime<Utc>> {
        self.guard("get_last_access_time", self.inner.get_last_access_time(key))
            .await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.guard("delete", self.inner.delete(key)).await
    }
}
