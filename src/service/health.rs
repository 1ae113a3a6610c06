//! Counter store health probe.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;

use crate::clock::Clock;
use crate::store::CounterStore;

/// Key read by the probe. It is never written.
const HEALTH_KEY: &str = "health";

/// Result of a health probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    /// Whether the store answered
    pub healthy: bool,
    /// When the probe ran
    pub timestamp: DateTime<Utc>,
}

/// Probes the counter store with a single read.
pub struct HealthChecker {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
}

impl HealthChecker {
    /// Create a checker over `store`.
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Read the probe key; any store error reports unhealthy.
    pub async fn check(&self) -> HealthStatus {
        let healthy = match self.store.get_count(HEALTH_KEY).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "Counter store health check failed");
                false
            }
        };

        HealthStatus {
            healthy,
            timestamp: self.clock.now(),
        }
    }
}
