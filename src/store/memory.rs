//! In-memory counter store.
//!
//! Backs single-node deployments and tests. Per-key atomicity comes from the
//! shard lock `DashMap` holds while an entry is being mutated.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::CounterStore;
use crate::clock::{chrono_delta, Clock};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default)]
struct Entry {
    count: u64,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// A [`CounterStore`] held in process memory.
///
/// Expired entries read as absent. They are dropped on every key scan, so
/// the cleanup sweep bounds the map, and on demand by
/// [`MemoryCounterStore::purge_expired`].
pub struct MemoryCounterStore {
    entries: DashMap<String, Entry>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    /// Create an empty store whose expiry is driven by `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
        }
    }

    /// Drop every expired entry. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before - self.entries.len()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries.iter().filter(|e| !e.is_expired(now)).count()
    }

    /// Entries held in the map, expired ones included.
    #[cfg(test)]
    pub(crate) fn raw_len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Set `key` to `count` with an optional TTL, replacing any previous value.
    pub fn set(&self, key: &str, count: u64, ttl: Option<Duration>) {
        let now = self.clock.now();
        let expires_at = ttl
            .and_then(chrono_delta)
            .and_then(|d| now.checked_add_signed(d));
        self.entries
            .insert(key.to_string(), Entry { count, expires_at });
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    async fn increment_with_expiration(
        &self,
        key: &str,
        max_limit: u64,
        expiry: Duration,
    ) -> Result<bool> {
        let now = self.clock.now();
        let mut entry = self.entries.entry(key.to_string()).or_default();

        if entry.is_expired(now) {
            *entry = Entry::default();
        }

        entry.count += 1;
        if entry.count == 1 {
            entry.expires_at = chrono_delta(expiry).and_then(|d| now.checked_add_signed(d));
        }

        Ok(entry.count <= max_limit)
    }

    async fn get_count(&self, key: &str) -> Result<u64> {
        let now = self.clock.now();
        Ok(self
            .entries
            .get(key)
            .filter(|e| !e.is_expired(now))
            .map(|e| e.count)
            .unwrap_or(0))
    }

    async fn get_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let now = self.clock.now();
        self.entries.retain(|_, entry| !entry.is_expired(now));

        Ok(self
            .entries
            .iter()
            .filter(|e| glob_match(pattern, e.key()))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn get_last_access_time(&self, key: &str) -> Result<DateTime<Utc>> {
        let now = self.clock.now();
        let expires_at = self
            .entries
            .get(key)
            .and_then(|e| e.expires_at)
            .filter(|at| *at > now);

        Ok(expires_at.unwrap_or(now))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// Redis-style glob matching supporting `*` and `?`.
fn glob_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();

    let (mut pi, mut ti) = (0, 0);
    // Position of the last `*` seen and the text index it was tried against.
    let mut backtrack: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            backtrack = Some((pi, ti));
            pi += 1;
        } else if let Some((star, matched)) = backtrack {
            pi = star + 1;
            ti = matched + 1;
            backtrack = Some((star, matched + 1));
        } else {
            return false;
        }
    }

    p[pi..].iter().all(|c| *c == '*')
}
