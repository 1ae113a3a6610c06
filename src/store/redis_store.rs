//! Redis-backed counter store for multi-instance deployments.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, Script};
use tracing::trace;

use super::CounterStore;
use crate::clock::{chrono_delta, Clock};
use crate::error::Result;

/// Keys scanned per SCAN round trip.
const SCAN_BATCH: usize = 500;

/// INCR and first-write PEXPIRE in one atomic step.
const INCREMENT_SCRIPT: &str = r#"
local current = redis.call("INCR", KEYS[1])
if current == 1 then
    redis.call("PEXPIRE", KEYS[1], ARGV[1])
end
return current
"#;

/// A [`CounterStore`] shared through Redis.
#[derive(Clone)]
pub struct RedisCounterStore {
    connection_manager: ConnectionManager,
    increment: Arc<Script>,
    clock: Arc<dyn Clock>,
}

impl RedisCounterStore {
    /// Connect to the Redis server at `url`.
    pub async fn connect(url: &str, clock: Arc<dyn Clock>) -> Result<Self> {
        let client = Client::open(url)?;
        let connection_manager = client.get_connection_manager().await?;
        Ok(Self::from_connection_manager(connection_manager, clock))
    }

    /// Wrap an existing connection manager.
    pub fn from_connection_manager(
        connection_manager: ConnectionManager,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            connection_manager,
            increment: Arc::new(Script::new(INCREMENT_SCRIPT)),
            clock,
        }
    }
}

#[async_trait]
impl CounterStore for RedisCounterStore {
    async fn increment_with_expiration(
        &self,
        key: &str,
        max_limit: u64,
        expiry: Duration,
    ) -> Result<bool> {
        let mut conn = self.connection_manager.clone();
        let expiry_ms = expiry.as_millis().max(1) as u64;

        let count: u64 = self
            .increment
            .key(key)
            .arg(expiry_ms)
            .invoke_async(&mut conn)
            .await?;

        trace!(key = %key, count = count, "Incremented Redis counter");
        Ok(count <= max_limit)
    }

    async fn get_count(&self, key: &str) -> Result<u64> {
        let mut conn = self.connection_manager.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(parse_count(value.as_deref()))
    }

    async fn get_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.connection_manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await?;

            keys.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        keys.sort_unstable();
        keys.dedup();
        Ok(keys)
    }

    async fn get_last_access_time(&self, key: &str) -> Result<DateTime<Utc>> {
        let mut conn = self.connection_manager.clone();
        // -2 when the key is missing, -1 when it has no expiry.
        let ttl_ms: i64 = conn.pttl(key).await?;
        let now = self.clock.now();

        let remaining = if ttl_ms > 0 {
            chrono_delta(Duration::from_millis(ttl_ms as u64))
        } else {
            None
        };

        Ok(remaining
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(now))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection_manager.clone();
        let _: i64 = conn.del(key).await?;
        Ok(())
    }
}

/// A stored value that is missing or not an integer counts as 0.
fn parse_count(value: Option<&str>) -> u64 {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(0)
}
