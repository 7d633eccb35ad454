use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pricefeed_core::{FeedError, LimiterPool, RateLimiter};
use pricefeed_types::SourceName;
use tokio::time::Instant;

#[tokio::test(start_paused = true)]
async fn throughput_never_exceeds_rps() {
    let limiter = Arc::new(RateLimiter::new("host-5", Some(5.0), 16));
    let starts: Arc<std::sync::Mutex<Vec<Instant>>> = Arc::default();

    let mut handles = Vec::new();
    for _ in 0..15 {
        let limiter = Arc::clone(&limiter);
        let starts = Arc::clone(&starts);
        handles.push(tokio::spawn(async move {
            limiter
                .submit(|| async {
                    starts.lock().unwrap().push(Instant::now());
                    Ok::<_, FeedError>(())
                })
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }

    let starts = starts.lock().unwrap().clone();
    assert_eq!(starts.len(), 15);
    // No sliding 1-second window may contain more than 5 starts.
    for (i, t) in starts.iter().enumerate() {
        let in_window = starts
            .iter()
            .filter(|s| **s >= *t && s.duration_since(*t) < Duration::from_secs(1))
            .count();
        assert!(in_window <= 5, "window starting at sample {i} held {in_window} starts");
    }
    // 15 jobs at 5 rps finish within ceil(15/5) seconds plus refill jitter.
    let span = starts
        .iter()
        .max()
        .unwrap()
        .duration_since(*starts.iter().min().unwrap());
    assert!(span <= Duration::from_secs(4), "span was {span:?}");
}

#[tokio::test]
async fn unlimited_limiter_passes_jobs_through() {
    let limiter = RateLimiter::new("host-unlimited", None, 8);
    let before = std::time::Instant::now();
    for _ in 0..50 {
        limiter.submit(|| async { Ok::<_, FeedError>(()) }).await.unwrap();
    }
    assert!(before.elapsed() < Duration::from_millis(500));
}

#[tokio::test]
async fn concurrency_cap_bounds_in_flight_jobs() {
    let limiter = Arc::new(RateLimiter::new("host", None, 2));
    let in_flight = Arc::new(AtomicU32::new(0));
    let peak = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..10 {
        let limiter = Arc::clone(&limiter);
        let in_flight = Arc::clone(&in_flight);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            limiter
                .submit(|| async {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, FeedError>(())
                })
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn retryable_failures_requeue_until_success() {
    let limiter = RateLimiter::new("host", None, 4);
    let attempts = AtomicU32::new(0);

    let out = limiter
        .run_with_retry(3, || async {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(FeedError::UpstreamStatus {
                    source: SourceName::Binance,
                    status: 500,
                })
            } else {
                Ok(42u32)
            }
        })
        .await;
    assert_eq!(out.unwrap(), 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn non_retryable_failures_surface_immediately() {
    let limiter = RateLimiter::new("host", None, 4);
    let attempts = AtomicU32::new(0);

    let out: Result<u32, _> = limiter
        .run_with_retry(5, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(FeedError::UpstreamStatus {
                source: SourceName::Binance,
                status: 400,
            })
        })
        .await;
    assert!(matches!(
        out,
        Err(FeedError::UpstreamStatus { status: 400, .. })
    ));
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn exhausted_retries_surface_the_last_error() {
    let limiter = RateLimiter::new("host", None, 4);
    let attempts = AtomicU32::new(0);

    let out: Result<u32, _> = limiter
        .run_with_retry(2, || async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err(FeedError::UpstreamStatus {
                source: SourceName::Binance,
                status: 429,
            })
        })
        .await;
    assert!(matches!(
        out,
        Err(FeedError::UpstreamStatus { status: 429, .. })
    ));
    // One initial attempt plus two retries.
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn shutdown_rejects_new_jobs() {
    let limiter = RateLimiter::new("host", None, 2);
    limiter.shutdown(Duration::from_millis(100)).await;
    let out: Result<(), _> = limiter.submit(|| async { Ok(()) }).await;
    assert!(matches!(out, Err(FeedError::ShuttingDown)));
}

#[tokio::test]
async fn pool_shares_limiters_per_host_and_rate() {
    let pool = LimiterPool::new();
    let a = pool.limiter("api.binance.com", Some(10.0), 4);
    let b = pool.limiter("api.binance.com", Some(10.0), 4);
    let c = pool.limiter("api.binance.com", Some(5.0), 4);
    let d = pool.limiter("api.kraken.com", Some(10.0), 4);
    assert!(Arc::ptr_eq(&a, &b));
    assert!(!Arc::ptr_eq(&a, &c));
    assert!(!Arc::ptr_eq(&a, &d));
    assert_eq!(a.key(), "api.binance.com-10");
}
