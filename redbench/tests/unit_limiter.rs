use redbench::limiter::RateLimiter;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

// Timing assertions run on tokio's paused clock, which auto-advances to the
// next timer whenever every task is waiting.

#[test]
fn test_capacity_is_one_millisecond_of_tokens() {
    assert_eq!(RateLimiter::new(100.0).capacity(), 1);
    assert_eq!(RateLimiter::new(10_000.0).capacity(), 10);
    assert_eq!(RateLimiter::new(2_500.0).capacity(), 3);
    assert_eq!(RateLimiter::with_capacity(50.0, 7).capacity(), 7);
    assert_eq!(RateLimiter::new(50.0).per_second(), 50.0);
}

#[tokio::test(start_paused = true)]
async fn test_batched_acquisition_is_throttled() {
    // 1000 requests at 100/s taken 10 at a time must take about ten seconds.
    let limiter = RateLimiter::new(100.0);
    let start = Instant::now();
    for _ in 0..100 {
        limiter.acquire(10).await;
    }
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(9_980), "finished too early: {elapsed:?}");
    assert!(elapsed <= Duration::from_millis(10_050), "finished too late: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_full_bucket_allows_initial_burst() {
    let limiter = RateLimiter::with_capacity(100.0, 50);
    let start = Instant::now();
    limiter.acquire(50).await;
    assert!(start.elapsed() < Duration::from_millis(2));

    // The bucket is now empty: one more token costs one interval.
    limiter.acquire(1).await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(10) && elapsed < Duration::from_millis(12), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_idle_bucket_refills_only_to_capacity() {
    let limiter = RateLimiter::with_capacity(100.0, 5);
    limiter.acquire(5).await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    let start = Instant::now();
    limiter.acquire(5).await;
    assert!(start.elapsed() < Duration::from_millis(2));
    limiter.acquire(5).await;
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(50) && elapsed < Duration::from_millis(52), "{elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_rate_is_shared_across_tasks() {
    let limiter = Arc::new(RateLimiter::new(100.0));
    let start = Instant::now();

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let limiter = Arc::clone(&limiter);
        tasks.push(tokio::spawn(async move {
            for _ in 0..25 {
                limiter.acquire(5).await;
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    // 4 * 25 * 5 = 500 tokens at 100/s
    let elapsed = start.elapsed();
    assert!(elapsed >= Duration::from_millis(4_980), "finished too early: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn test_tiny_rate_saturates_instead_of_overflowing() {
    let limiter = RateLimiter::new(1e-12);
    let first = limiter.reserve(1_000_000);
    let second = limiter.reserve(1_000_000);
    assert!(second >= first);
}
