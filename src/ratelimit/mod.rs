//! Rate limiting, usage metrics and counter cleanup.

mod backend;
mod limiter;
mod metrics;
mod sweeper;
mod window;

pub use backend::RateLimiterBackend;
pub use limiter::{
    RateLimitConfig, RateLimiter, DEFAULT_COUNTER_TTL, DEFAULT_KEY_PREFIX,
    DEFAULT_METRICS_WINDOW_SECONDS,
};
pub use metrics::{AggregatedMetrics, MetricsAggregator};
pub use sweeper::CleanupSweeper;
pub use window::{Scope, WindowKeys};
