//! Eviction of per-sender counters that look inactive.
//!
//! Inactivity is judged from `now + remaining TTL` as reported by the store.
//! That value measures time until expiry rather than true access recency, so
//! a key close to its natural expiry looks as recent as `now`. The sweep is
//! best effort: a key deleted just before a new increment simply restarts at
//! one.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::limiter::RateLimiter;
use super::window::WindowKeys;
use crate::clock::{chrono_delta, Clock};
use crate::error::Result;
use crate::store::CounterStore;

/// Deletes stale per-sender counter keys.
pub struct CleanupSweeper {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    keys: WindowKeys,
}

impl CleanupSweeper {
    /// Create a sweeper over `store`.
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>, keys: WindowKeys) -> Self {
        Self { store, clock, keys }
    }

    /// Create a sweeper sharing a limiter's store, clock and keys.
    pub fn from_limiter(limiter: &RateLimiter) -> Self {
        Self::new(
            limiter.store().clone(),
            limiter.clock().clone(),
            limiter.keys().clone(),
        )
    }

    /// Delete every sender key whose derived last access is older than
    /// `now - inactivity_threshold`. Returns the number of keys deleted.
    pub async fn cleanup_inactive_senders(&self, inactivity_threshold: Duration) -> Result<usize> {
        let now = self.clock.now();
        let Some(cutoff) =
            chrono_delta(inactivity_threshold).and_then(|d| now.checked_sub_signed(d))
        else {
            return Ok(0);
        };

        let keys = self.store.get_keys(&self.keys.sender_pattern()).await?;
        let scanned = keys.len();
        let mut deleted = 0;

        for key in keys {
            let last_access = self.store.get_last_access_time(&key).await?;
            if last_access < cutoff {
                self.store.delete_key(&key).await?;
                debug!(key = %key, last_access = %last_access, "Deleted inactive counter");
                deleted += 1;
            }
        }

        info!(scanned = scanned, deleted = deleted, "Cleanup sweep finished");
        Ok(deleted)
    }

    /// Sweep every `interval` until `shutdown` resolves.
    ///
    /// A failed pass is logged and the next one runs on schedule.
    pub async fn run<F>(&self, interval: Duration, inactivity_threshold: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(
            interval_secs = interval.as_secs(),
            inactivity_threshold_secs = inactivity_threshold.as_secs(),
            "Starting cleanup sweeper"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Cleanup sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.cleanup_inactive_senders(inactivity_threshold).await {
                        warn!(error = %e, "Cleanup sweep failed");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryCounterStore;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use dashmap::DashMap;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    /// A store that reports scripted last-access times.
    struct ScriptedStore {
        last_access: DashMap<String, DateTime<Utc>>,
    }

    #[async_trait]
    impl CounterStore for ScriptedStore {
        async fn increment_with_expiration(&self, _: &str, _: u64, _: Duration) -> Result<bool> {
            Ok(true)
        }

        async fn get_count(&self, key: &str) -> Result<u64> {
            Ok(u64::from(self.last_access.contains_key(key)))
        }

        async fn get_keys(&self, pattern: &str) -> Result<Vec<String>> {
            let prefix = pattern.trim_end_matches('*');
            Ok(self
                .last_access
                .iter()
                .filter(|e| e.key().starts_with(prefix))
                .map(|e| e.key().clone())
                .collect())
        }

        async fn get_last_access_time(&self, key: &str) -> Result<DateTime<Utc>> {
            Ok(self.last_access.get(key).map(|e| *e).unwrap_or_else(Utc::now))
        }

        async fn delete(&self, key: &str) -> Result<()> {
            self.last_access.remove(key);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_deletes_stale_and_keeps_recent() {
        let now = start();
        let store = Arc::new(ScriptedStore {
            last_access: DashMap::new(),
        });
        store.last_access.insert(
            "rate_limit:sender:stale:20240101115000".to_string(),
            now - chrono::Duration::minutes(10),
        );
        store.last_access.insert(
            "rate_limit:sender:recent:20240101115900".to_string(),
            now - chrono::Duration::seconds(30),
        );
        store.last_access.insert(
            "rate_limit:global:20240101115000".to_string(),
            now - chrono::Duration::minutes(10),
        );

        let sweeper = CleanupSweeper::new(
            store.clone(),
            Arc::new(ManualClock::new(now)),
            WindowKeys::new("rate_limit"),
        );

        let deleted = sweeper
            .cleanup_inactive_senders(Duration::from_secs(300))
            .await
            .unwrap();

        assert_eq!(deleted, 1);
        assert!(!store
            .last_access
            .contains_key("rate_limit:sender:stale:20240101115000"));
        assert!(store
            .last_access
            .contains_key("rate_limit:sender:recent:20240101115900"));
        // Global counters are never swept.
        assert!(store
            .last_access
            .contains_key("rate_limit:global:20240101115000"));
    }

    #[tokio::test]
    async fn test_live_counters_survive_sweep() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(MemoryCounterStore::new(clock.clone()));
        let limiter = RateLimiter::with_clock(
            store.clone(),
            clock.clone(),
            crate::ratelimit::RateLimitConfig::new(10, 100),
        )
        .unwrap();

        limiter.can_send("+1").await.unwrap();
        limiter.can_send("+2").await.unwrap();

        // A TTL-derived last access is never earlier than now.
        let sweeper = CleanupSweeper::from_limiter(&limiter);
        let deleted = sweeper
            .cleanup_inactive_senders(Duration::from_secs(1))
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_sweep_releases_expired_buckets() {
        let clock = Arc::new(ManualClock::new(start()));
        let store = Arc::new(MemoryCounterStore::new(clock.clone()));
        let limiter = RateLimiter::with_clock(
            store.clone(),
            clock.clone(),
            crate::ratelimit::RateLimitConfig::new(10, 100),
        )
        .unwrap();

        for _ in 0..1000 {
            limiter.can_send("+1").await.unwrap();
            limiter.can_send_global().await.unwrap();
            clock.advance(Duration::from_secs(1));
        }
        assert_eq!(store.raw_len(), 2000);

        let sweeper = CleanupSweeper::from_limiter(&limiter);
        let deleted = sweeper
            .cleanup_inactive_senders(Duration::ZERO)
            .await
            .unwrap();

        assert_eq!(deleted, 0);
        assert_eq!(store.raw_len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_on_shutdown() {
        let now = start();
        let store = Arc::new(ScriptedStore {
            last_access: DashMap::new(),
        });
        store.last_access.insert(
            "rate_limit:sender:stale:1".to_string(),
            now - chrono::Duration::hours(1),
        );

        let sweeper = CleanupSweeper::new(
            store.clone(),
            Arc::new(ManualClock::new(now)),
            WindowKeys::new("rate_limit"),
        );

        sweeper
            .run(
                Duration::from_secs(60),
                Duration::from_secs(300),
                tokio::time::sleep(Duration::from_secs(90)),
            )
            .await;

        assert!(store.last_access.is_empty());
    }
}
