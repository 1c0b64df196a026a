//! End-to-end admission control tests against the public API.
//!
//! All timing runs on a `ManualClock`, so waits are exact and the tests do
//! not sleep in real time.

use std::sync::Arc;
use std::time::Duration;

use scrapegate::{
    AdmissionConfig, Clock, ManualClock, Priority, QueueError, RateLimitConfig, RateLimiter,
    RequestQueue, RequestTarget, ScopeKey, TokenBucket,
};

async fn limiter() -> (RateLimiter, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let limiter = RateLimiter::with_clock(clock.clone());
    limiter
        .configure(
            ScopeKey::Global,
            RateLimitConfig::new(1000.0, 10_000, 100_000, 1000, 0.0),
        )
        .await
        .unwrap();
    (limiter, clock)
}

#[test]
fn bucket_burst_then_deferred_waits() {
    let bucket = TokenBucket::new(2.0, 3, Arc::new(ManualClock::new()));

    let waits: Vec<Duration> = (0..5).map(|_| bucket.acquire(1)).collect();

    assert_eq!(
        waits,
        vec![
            Duration::ZERO,
            Duration::ZERO,
            Duration::ZERO,
            Duration::from_millis(500),
            Duration::from_secs(1),
        ]
    );
    assert!((0.0..=3.0).contains(&bucket.tokens()));
}

#[tokio::test]
async fn queue_full_tier_is_isolated() {
    let queue = RequestQueue::new(2);

    queue.put("A".to_string(), Priority::High).await.unwrap();
    queue.put("B".to_string(), Priority::High).await.unwrap();
    assert!(matches!(
        queue.put("C".to_string(), Priority::High).await,
        Err(QueueError::TierFull {
            tier: Priority::High,
            ..
        })
    ));
    queue.put("D".to_string(), Priority::Low).await.unwrap();

    assert_eq!(queue.get().await.unwrap().item, "A");
    assert_eq!(queue.get().await.unwrap().item, "B");
    assert_eq!(queue.get().await.unwrap().item, "D");
    assert!(queue.get().await.is_none());
}

#[tokio::test]
async fn retailer_minute_window_blocks_third_call() {
    let (limiter, clock) = limiter().await;
    limiter
        .configure(
            ScopeKey::retailer("X"),
            RateLimitConfig::new(100.0, 2, 1000, 100, 0.0),
        )
        .await
        .unwrap();
    let target = RequestTarget::retailer("X");

    assert_eq!(limiter.acquire(&target).await, Duration::ZERO);
    assert_eq!(limiter.acquire(&target).await, Duration::ZERO);
    clock.advance(Duration::from_secs(1));
    assert_eq!(limiter.acquire(&target).await, Duration::from_secs(59));

    // After the first two age out of the minute window, there is room again.
    clock.advance(Duration::from_secs(60));
    assert_eq!(limiter.acquire(&target).await, Duration::ZERO);
}

#[tokio::test]
async fn guard_failure_records_releases_and_cools_down() {
    let (limiter, clock) = limiter().await;
    limiter
        .configure(
            ScopeKey::retailer("shop"),
            RateLimitConfig::new(100.0, 1000, 10_000, 100, 0.5),
        )
        .await
        .unwrap();
    limiter.set_concurrent_limit("shop", 1).await.unwrap();

    #[derive(Debug, PartialEq)]
    struct FetchError(u16);

    let target = RequestTarget::retailer("shop").with_domain("shop.example");
    let result: Result<(), FetchError> = limiter
        .run(&target, || async {
            // The single permit is taken while the operation runs.
            Err(FetchError(503))
        })
        .await;

    assert_eq!(result, Err(FetchError(503)));
    let stats = limiter.get_stats("shop").await;
    assert_eq!(stats.failed_requests, 1);
    assert_eq!(stats.total_requests, 1);
    assert_eq!(limiter.available_permits("shop").await, Some(1));
    assert_eq!(clock.sleeps(), vec![Duration::from_millis(500)]);
}

#[tokio::test]
async fn concurrency_cap_serializes_guarded_work() {
    let (limiter, _clock) = limiter().await;
    limiter
        .configure(
            ScopeKey::domain("slow.example"),
            RateLimitConfig::new(1000.0, 10_000, 100_000, 1000, 0.0),
        )
        .await
        .unwrap();
    limiter.set_concurrent_limit("slow.example", 1).await.unwrap();

    let in_flight = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let target = RequestTarget::domain("slow.example");

    let tasks = (0..4).map(|_| {
        let limiter = limiter.clone();
        let target = target.clone();
        let in_flight = in_flight.clone();
        let peak = peak.clone();
        async move {
            limiter
                .run(&target, || async {
                    use std::sync::atomic::Ordering;
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::task::yield_now().await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, ()>(())
                })
                .await
        }
    });
    let results = futures::future::join_all(tasks).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(peak.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(
        limiter.get_stats("slow.example").await.successful_requests,
        4
    );
}

#[tokio::test]
async fn default_table_drives_dispatch() {
    let config = AdmissionConfig::default();
    let clock = Arc::new(ManualClock::new());
    let limiter = config.build_limiter(clock.clone()).await.unwrap();
    let queue: RequestQueue<String> = config.build_queue();

    for (i, priority) in ["low", "high", "normal", "urgent"].iter().enumerate() {
        queue
            .put(format!("job-{}", i), Priority::from_label(priority))
            .await
            .unwrap();
    }

    let mut order = Vec::new();
    while let Some(entry) = queue.get().await {
        let target = RequestTarget::retailer("costco").with_priority(entry.priority);
        let result: Result<(), ()> = limiter.run(&target, || async { Ok(()) }).await;
        queue.mark_completed(&entry.item, result.is_ok()).await;
        order.push(entry.item);
    }

    assert_eq!(order, vec!["job-1", "job-2", "job-3", "job-0"]);
    let stats = queue.get_stats().await;
    assert_eq!(stats.completed, 4);
    assert_eq!(stats.success_rate, 100.0);

    let all = limiter.get_all_stats().await;
    let report = &all["costco"];
    assert_eq!(report.total_requests, 4);
    assert_eq!(report.successful_requests, 4);
    assert_eq!(report.success_rate, 100.0);
    // Each job ends with costco's 3s cooldown, which refills enough of the
    // bucket that none of them had to wait for admission.
    assert_eq!(report.throttled_requests, 0);
    assert_eq!(clock.elapsed(), Duration::from_secs(12));
}

#[tokio::test]
async fn concurrent_workers_share_virtual_time() {
    let (limiter, clock) = limiter().await;
    let target = RequestTarget::domain("fast.example");

    let workers = (0..4).map(|_| {
        let limiter = limiter.clone();
        let target = target.clone();
        async move {
            let clock = limiter.clock().clone();
            limiter
                .run(&target, || async move {
                    clock.sleep(Duration::from_secs(1)).await;
                    Ok::<_, ()>(())
                })
                .await
        }
    });
    let results = futures::future::join_all(workers).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(clock.sleeps().len(), 4);
    assert_eq!(clock.elapsed(), Duration::from_secs(1));
}
