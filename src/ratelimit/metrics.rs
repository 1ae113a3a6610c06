//! Historical usage over arbitrary time ranges.
//!
//! Every second in the requested range costs one store read: a one-day query
//! issues about 86,400 reads. The range is never silently bounded; large
//! queries are only logged. A bulk read path can replace [`sum_buckets`]
//! here without touching admission.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::limiter::{sum_buckets, RateLimiter};
use super::window::{Scope, WindowKeys};
use crate::error::Result;
use crate::store::CounterStore;

/// Ranges longer than this many buckets are logged as expensive.
const LARGE_RANGE_BUCKETS: u64 = 86_400;

/// Totals for one scope over a time range.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedMetrics {
    /// Sender the totals belong to, `None` for global metrics
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender_number: Option<String>,
    /// Sum of every bucket in the range
    pub total_message_count: u64,
    /// `total * 100 / (limit * duration_seconds)`, 0 for an empty duration
    pub average_usage_percentage: f64,
    /// Start of the range
    pub from_time: DateTime<Utc>,
    /// End of the range, inclusive
    pub to_time: DateTime<Utc>,
}

/// Sums per-second buckets across a time range.
pub struct MetricsAggregator {
    store: Arc<dyn CounterStore>,
    keys: WindowKeys,
    max_per_sender: u64,
    max_global: u64,
}

impl MetricsAggregator {
    /// Create an aggregator over `store` using the given per-bucket limits.
    pub fn new(
        store: Arc<dyn CounterStore>,
        keys: WindowKeys,
        max_per_sender: u64,
        max_global: u64,
    ) -> Self {
        Self {
            store,
            keys,
            max_per_sender,
            max_global,
        }
    }

    /// Create an aggregator sharing a limiter's store, keys and limits.
    pub fn from_limiter(limiter: &RateLimiter) -> Self {
        Self::new(
            limiter.store().clone(),
            limiter.keys().clone(),
            limiter.max_messages_per_sender(),
            limiter.max_messages_global(),
        )
    }

    /// Totals for `sender_id` between `from` and `to`, inclusive.
    pub async fn get_aggregated_sender_metrics(
        &self,
        sender_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<AggregatedMetrics> {
        let mut metrics = self
            .aggregate(Scope::Sender(sender_id), self.max_per_sender, from, to)
            .await?;
        metrics.sender_number = Some(sender_id.to_string());
        Ok(metrics)
    }

    /// Global totals between `from` and `to`, inclusive.
    pub async fn get_aggregated_global_metrics(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<AggregatedMetrics> {
        self.aggregate(Scope::Global, self.max_global, from, to)
            .await
    }

    async fn aggregate(
        &self,
        scope: Scope<'_>,
        limit: u64,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<AggregatedMetrics> {
        let buckets = bucket_count(from, to);

        if buckets > LARGE_RANGE_BUCKETS {
            warn!(
                scope = %scope,
                buckets = buckets,
                "Aggregating a large range, one store read per second"
            );
        } else {
            debug!(scope = %scope, buckets = buckets, "Aggregating metrics");
        }

        let keys = range_keys(&self.keys, &scope, from, to);
        let total = sum_buckets(self.store.as_ref(), keys).await?;

        let duration_seconds = (to - from).num_milliseconds() as f64 / 1000.0;
        let max_possible = limit as f64 * duration_seconds;
        let average_usage_percentage = if max_possible > 0.0 {
            (total as f64 * 100.0) / max_possible
        } else {
            0.0
        };

        Ok(AggregatedMetrics {
            sender_number: None,
            total_message_count: total,
            average_usage_percentage,
            from_time: from,
            to_time: to,
        })
    }
}

/// One key per one-second step from `from` through `to`, built on demand.
fn range_keys<'a>(
    keys: &'a WindowKeys,
    scope: &'a Scope<'a>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> impl Iterator<Item = String> + 'a {
    let step = chrono::Duration::seconds(1);
    std::iter::successors(Some(from), move |at| at.checked_add_signed(step))
        .take_while(move |at| *at <= to)
        .map(move |at| keys.bucket_key(scope, at))
}

/// Number of keys [`range_keys`] yields for the same range.
fn bucket_count(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    if to < from {
        return 0;
    }
    u64::try_from((to - from).num_seconds()).map_or(0, |s| s.saturating_add(1))
}
