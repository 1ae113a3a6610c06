use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use futures::future::join_all;

use smsguard::clock::ManualClock;
use smsguard::ratelimit::{CleanupSweeper, MetricsAggregator, RateLimitConfig, RateLimiter};
use smsguard::service::{MessageService, SmsRequest, RATE_LIMIT_EXCEEDED};
use smsguard::store::{CounterStore, MemoryCounterStore, TimeoutStore};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap()
}

fn build_limiter(config: RateLimitConfig) -> (Arc<ManualClock>, Arc<RateLimiter>) {
    let clock = Arc::new(ManualClock::new(start()));
    let store: Arc<dyn CounterStore> = Arc::new(TimeoutStore::new(
        MemoryCounterStore::new(clock.clone()),
        Duration::from_secs(1),
    ));
    let limiter = RateLimiter::with_clock(store, clock.clone(), config).unwrap();
    (clock, Arc::new(limiter))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sender_admission_is_bounded() {
    let (_, limiter) = build_limiter(RateLimitConfig::new(10, 1000));

    let handles: Vec<_> = (0..11)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.can_send("+1234567890").await.unwrap() })
        })
        .collect();

    let results: Vec<bool> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    assert_eq!(results.iter().filter(|allowed| **allowed).count(), 10);
    assert_eq!(results.iter().filter(|allowed| !**allowed).count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_bounded_admission_for_many_callers() {
    let (_, limiter) = build_limiter(RateLimitConfig::new(10, 1000));

    let handles: Vec<_> = (0..100)
        .map(|_| {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.can_send("+1234567890").await.unwrap() })
        })
        .collect();

    let admitted = join_all(handles)
        .await
        .into_iter()
        .filter(|r| *r.as_ref().unwrap())
        .count();

    assert_eq!(admitted, 10);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_global_bound_across_senders() {
    let global_limit = 50;
    let (_, limiter) = build_limiter(RateLimitConfig::new(10, global_limit));
    let service = Arc::new(MessageService::new(limiter.clone()));

    let mut handles = Vec::new();
    for sender in 0..20 {
        for _ in 0..5 {
            let service = service.clone();
            handles.push(tokio::spawn(async move {
                let request = SmsRequest::new(format!("+1000000{:04}", sender), "+15550000", "hi");
                service.send_message(&request).await.unwrap()
            }));
        }
    }

    let responses: Vec<_> = join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap())
        .collect();

    let admitted = responses.iter().filter(|r| r.success).count();
    assert!(admitted <= global_limit as usize);
    assert_eq!(admitted, global_limit as usize);
    assert!(responses
        .iter()
        .filter(|r| !r.success)
        .all(|r| r.message == RATE_LIMIT_EXCEEDED));
}

#[tokio::test]
async fn test_exhausted_sender_recovers_next_second() {
    let (clock, limiter) = build_limiter(RateLimitConfig::new(3, 100));

    for _ in 0..3 {
        assert!(limiter.can_send("+1").await.unwrap());
    }
    assert!(!limiter.can_send("+1").await.unwrap());

    clock.advance(Duration::from_secs(1));
    for _ in 0..3 {
        assert!(limiter.can_send("+1").await.unwrap());
    }
}

#[tokio::test]
async fn test_empty_reads() {
    let (_, limiter) = build_limiter(RateLimitConfig::new(10, 100));
    let aggregator = MetricsAggregator::from_limiter(&limiter);

    assert_eq!(limiter.get_count_for_key("rate_limit:global:19700101000000").await.unwrap(), 0);

    let metrics = aggregator
        .get_aggregated_global_metrics(start() - chrono::Duration::hours(1), start())
        .await
        .unwrap();
    assert_eq!(metrics.total_message_count, 0);
    assert_eq!(metrics.average_usage_percentage, 0.0);
}

#[tokio::test]
async fn test_global_usage_percentage_scenario() {
    let mut config = RateLimitConfig::new(10, 100);
    config.counter_ttl = Duration::from_secs(30);
    let (clock, limiter) = build_limiter(config);

    for second in 0..10 {
        if second > 0 {
            clock.advance(Duration::from_secs(1));
        }
        for _ in 0..50 {
            assert!(limiter.can_send_global().await.unwrap());
        }
    }

    assert_eq!(limiter.get_global_usage_percentage().await.unwrap(), 50);
}

#[tokio::test]
async fn test_sweep_after_traffic_keeps_live_counters() {
    let (clock, limiter) = build_limiter(RateLimitConfig::new(10, 100));
    let sweeper = CleanupSweeper::from_limiter(&limiter);

    limiter.can_send("+1").await.unwrap();
    assert_eq!(
        sweeper
            .cleanup_inactive_senders(Duration::from_secs(60))
            .await
            .unwrap(),
        0
    );

    // Once expired the counter no longer appears in a scan.
    clock.advance(Duration::from_secs(5));
    assert_eq!(
        sweeper
            .cleanup_inactive_senders(Duration::from_secs(60))
            .await
            .unwrap(),
        0
    );
    assert_eq!(limiter.get_sender_usage_percentage("+1").await.unwrap(), 0);
}
