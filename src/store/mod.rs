//! Counter store abstraction.
//!
//! The engine never implements atomicity itself. Everything it needs from the
//! shared store is captured by [`CounterStore`]: an atomic increment that sets
//! an expiry on first write, plus read, scan, TTL and delete operations.

mod memory;
mod redis_store;
mod timeout;

pub use memory::MemoryCounterStore;
pub use redis_store::RedisCounterStore;
pub use timeout::TimeoutStore;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::clock::Clock;
use crate::config::{StoreBackend, StoreConfig};
use crate::error::Result;

/// Capability interface over the shared counter store.
///
/// Implementations must make `increment_with_expiration` atomic per key:
/// concurrent callers each observe a distinct, strictly increasing count.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Increment `key` by one, setting `expiry` when the resulting value is 1.
    ///
    /// Returns `true` if the resulting value is `<= max_limit`.
    async fn increment_with_expiration(
        &self,
        key: &str,
        max_limit: u64,
        expiry: Duration,
    ) -> Result<bool>;

    /// Current value of `key`, or 0 if it does not exist.
    async fn get_count(&self, key: &str) -> Result<u64>;

    /// Keys matching a glob-style pattern (`*` and `?`).
    async fn get_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// `now + remaining TTL` for `key`.
    ///
    /// This measures time until expiry, not true access recency. Keys without
    /// a TTL report `now`.
    async fn get_last_access_time(&self, key: &str) -> Result<DateTime<Utc>>;

    /// Remove `key` unconditionally.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Alias of [`CounterStore::delete`].
    async fn delete_key(&self, key: &str) -> Result<()> {
        self.delete(key).await
    }
}

/// Build the configured store, bounded by the configured timeout.
pub async fn connect(config: &StoreConfig, clock: Arc<dyn Clock>) -> Result<Arc<dyn CounterStore>> {
    let timeout = Duration::from_millis(config.timeout_ms);

    let store: Arc<dyn CounterStore> = match config.backend {
        StoreBackend::Memory => {
            info!("Using in-memory counter store");
            Arc::new(TimeoutStore::new(MemoryCounterStore::new(clock), timeout))
        }
        StoreBackend::Redis => {
            info!(url = %config.redis_url, "Connecting to Redis counter store");
            let store = RedisCounterStore::connect(&config.redis_url, clock).await?;
            Arc::new(TimeoutStore::new(store, timeout))
        }
    };

    Ok(store)
}
