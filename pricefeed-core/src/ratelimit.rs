//! Per-host token buckets with a concurrency cap and retry classification.
//!
//! One limiter exists per `hostname + '-' + rps` key. A limiter admits at
//! most `rps` job starts per one-second reservoir window, spaces starts by
//! `ceil(1000 / rps)` ms, and caps in-flight jobs with a semaphore. Retryable
//! failures requeue immediately: the reservoir already spaces the retry, so
//! an extra delay would penalize the job twice.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::FeedError;

struct Bucket {
    capacity: u32,
    min_time: Duration,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: u32,
    window_start: Instant,
    next_start: Instant,
}

const WINDOW: Duration = Duration::from_secs(1);

impl Bucket {
    fn new(rps: f64) -> Self {
        let capacity = rps.ceil().max(1.0) as u32;
        let min_ms = (1000.0 / rps).ceil() as u64;
        let now = Instant::now();
        Self {
            capacity,
            min_time: Duration::from_millis(min_ms.max(1)),
            state: Mutex::new(BucketState {
                tokens: capacity,
                window_start: now,
                next_start: now,
            }),
        }
    }

    /// Instant at which the caller may start, reserving its token.
    fn reserve(&self) -> Instant {
        let mut state = self.state.lock().expect("bucket mutex poisoned");
        let now = Instant::now();

        if now.duration_since(state.window_start) >= WINDOW {
            state.tokens = self.capacity;
            // Advance to the current window boundary rather than `now`, so
            // refills stay aligned to a fixed cadence.
            let elapsed = now.duration_since(state.window_start);
            let windows = elapsed.as_millis() / WINDOW.as_millis();
            state.window_start += WINDOW * windows as u32;
        }

        let mut start = state.next_start.max(now);
        if state.tokens == 0 {
            let refill_at = state.window_start + WINDOW;
            start = start.max(refill_at);
            state.tokens = self.capacity;
            state.window_start = refill_at;
        }
        state.tokens -= 1;
        state.next_start = start + self.min_time;
        start
    }
}

/// Token-bucket limiter with a concurrency cap and a retry policy.
pub struct RateLimiter {
    key: String,
    bucket: Option<Bucket>,
    concurrency: Arc<Semaphore>,
    max_permits: u32,
    // Serializes bucket waits so pending jobs start in arrival order.
    admission: AsyncMutex<()>,
    draining: AtomicBool,
}

impl RateLimiter {
    /// Build a limiter. `rps` of `None` or ≤ 0 disables throttling (jobs
    /// pass straight through the concurrency cap).
    #[must_use]
    pub fn new(key: impl Into<String>, rps: Option<f64>, max_concurrent: usize) -> Self {
        let bucket = rps.filter(|r| *r > 0.0).map(Bucket::new);
        let max_permits = max_concurrent.max(1);
        Self {
            key: key.into(),
            bucket,
            concurrency: Arc::new(Semaphore::new(max_permits)),
            max_permits: u32::try_from(max_permits).unwrap_or(u32::MAX),
            admission: AsyncMutex::new(()),
            draining: AtomicBool::new(false),
        }
    }

    /// The limiter's registry key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Run one job under the bucket and the concurrency cap.
    ///
    /// # Errors
    /// Returns [`FeedError::ShuttingDown`] when draining, otherwise the
    /// job's own outcome.
    pub async fn submit<T, F, Fut>(&self, job: F) -> Result<T, FeedError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, FeedError>>,
    {
        if self.draining.load(Ordering::Acquire) {
            return Err(FeedError::ShuttingDown);
        }
        let permit = self
            .concurrency
            .acquire()
            .await
            .map_err(|_| FeedError::ShuttingDown)?;

        if let Some(bucket) = &self.bucket {
            let admission = self.admission.lock().await;
            let start_at = bucket.reserve();
            tokio::time::sleep_until(start_at).await;
            drop(admission);
        }

        let out = job().await;
        drop(permit);
        out
    }

    /// Run a job factory with the retry policy applied.
    ///
    /// Retryable failures (network, HTTP 408/429/5xx) requeue immediately
    /// while retries remain; everything else surfaces at once.
    ///
    /// # Errors
    /// Returns the final attempt's error once retries are exhausted, or the
    /// first non-retryable error.
    pub async fn run_with_retry<T, F, Fut>(
        &self,
        max_retries: u32,
        job: F,
    ) -> Result<T, FeedError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, FeedError>>,
    {
        let mut attempt = 0u32;
        loop {
            match self.submit(&job).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < max_retries => {
                    attempt += 1;
                    debug!(
                        target = "pricefeed::ratelimit",
                        limiter = %self.key,
                        attempt,
                        max_retries,
                        %err,
                        "requeueing retryable failure"
                    );
                }
                Err(err) => {
                    if attempt > 0 {
                        warn!(
                            target = "pricefeed::ratelimit",
                            limiter = %self.key,
                            attempts = attempt + 1,
                            %err,
                            "job failed after retries"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Stop admitting jobs, then wait for in-flight ones up to `grace`.
    pub async fn shutdown(&self, grace: Duration) {
        self.draining.store(true, Ordering::Release);
        // Holding every permit means every in-flight job has finished.
        let _ = tokio::time::timeout(grace, self.concurrency.acquire_many(self.max_permits)).await;
        self.concurrency.close();
    }
}

/// Registry of limiters, one per `hostname + '-' + rps` key.
///
/// Sources sharing a host and rate share a limiter, so two adapters backed
/// by the same vendor host cannot jointly exceed the vendor's budget.
#[derive(Default)]
pub struct LimiterPool {
    limiters: Mutex<HashMap<String, Arc<RateLimiter>>>,
}

impl LimiterPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch or create the limiter for `host` at `rps`.
    ///
    /// # Panics
    /// Panics if the pool mutex is poisoned.
    #[must_use]
    pub fn limiter(
        &self,
        host: &str,
        rps: Option<f64>,
        max_concurrent: usize,
    ) -> Arc<RateLimiter> {
        let key = match rps {
            Some(r) if r > 0.0 => format!("{host}-{r}"),
            _ => format!("{host}-unlimited"),
        };
        let mut limiters = self.limiters.lock().expect("limiter pool mutex poisoned");
        Arc::clone(
            limiters
                .entry(key.clone())
                .or_insert_with(|| Arc::new(RateLimiter::new(key, rps, max_concurrent))),
        )
    }

    /// Drain every limiter, bounded by `grace` each.
    ///
    /// # Panics
    /// Panics if the pool mutex is poisoned.
    pub async fn shutdown(&self, grace: Duration) {
        let limiters: Vec<_> = {
            let map = self.limiters.lock().expect("limiter pool mutex poisoned");
            map.values().cloned().collect()
        };
        for limiter in limiters {
            limiter.shutdown(grace).await;
        }
    }
}
