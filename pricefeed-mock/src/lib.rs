//! Scriptable in-memory adapter for integration tests.
//!
//! Behavior is tailored per test through the builder-style setters: canned
//! prices, injected latency, forced errors, and call counting. The mock can
//! impersonate any source name so orchestrator wiring stays realistic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use pricefeed_core::{BatchQuoteProvider, FeedError, SourceAdapter};
use pricefeed_types::{Pair, PriceQuote, SourceName};

/// Simple in-memory adapter used by integration tests.
pub struct MockAdapter {
    name: SourceName,
    enabled: bool,
    prices: Mutex<HashMap<Pair, Decimal>>,
    fail_with: Mutex<Option<FeedError>>,
    delay: Mutex<Duration>,
    fetch_calls: AtomicUsize,
    batch_calls: AtomicUsize,
    with_batch: bool,
}

impl MockAdapter {
    /// Build an enabled mock impersonating `name`.
    #[must_use]
    pub fn new(name: SourceName) -> Arc<Self> {
        Arc::new(Self {
            name,
            enabled: true,
            prices: Mutex::new(HashMap::new()),
            fail_with: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            fetch_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            with_batch: false,
        })
    }

    /// Build a disabled mock.
    #[must_use]
    pub fn disabled(name: SourceName) -> Arc<Self> {
        Arc::new(Self {
            name,
            enabled: false,
            prices: Mutex::new(HashMap::new()),
            fail_with: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            fetch_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            with_batch: false,
        })
    }

    /// Build an enabled mock that also advertises batch capability.
    #[must_use]
    pub fn with_batch(name: SourceName) -> Arc<Self> {
        Arc::new(Self {
            name,
            enabled: true,
            prices: Mutex::new(HashMap::new()),
            fail_with: Mutex::new(None),
            delay: Mutex::new(Duration::ZERO),
            fetch_calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
            with_batch: true,
        })
    }

    /// Serve `price` for `pair`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set_price(&self, pair: &Pair, price: Decimal) {
        self.prices.lock().unwrap().insert(pair.clone(), price);
    }

    /// Fail every fetch with `err` until cleared with `None`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn fail_with(&self, err: Option<FeedError>) {
        *self.fail_with.lock().unwrap() = err;
    }

    /// Delay every fetch by `delay`.
    ///
    /// # Panics
    /// Panics if the internal mutex is poisoned.
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Number of `fetch_quote` calls observed.
    #[must_use]
    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    /// Number of `fetch_quotes` (batch) calls observed.
    #[must_use]
    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    async fn lookup(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        let delay = *self.delay.lock().unwrap();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = self.fail_with.lock().unwrap().clone() {
            return Err(err);
        }
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(pair)
            .copied()
            .ok_or_else(|| FeedError::price_not_found(format!("{} {pair}", self.name)))?;
        Ok(PriceQuote::new(pair.clone(), self.name, price))
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn name(&self) -> SourceName {
        self.name
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.lookup(pair).await
    }

    fn as_batch_provider(&self) -> Option<&dyn BatchQuoteProvider> {
        if self.with_batch { Some(self) } else { None }
    }
}

#[async_trait]
impl BatchQuoteProvider for MockAdapter {
    async fn fetch_quotes(&self, pairs: &[Pair]) -> Vec<Result<PriceQuote, FeedError>> {
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::with_capacity(pairs.len());
        for pair in pairs {
            out.push(self.lookup(pair).await);
        }
        out
    }
}
