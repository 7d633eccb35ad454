use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use pricefeed_types::{Pair, PriceQuote, SourceName, now_ms};

/// Cache key: one entry per `(source, pair)`.
pub type CacheKey = (SourceName, Pair);

#[derive(Debug, Clone)]
struct CacheEntry {
    quote: PriceQuote,
    expires_at: Instant,
}

/// In-memory TTL store of `(source, pair) -> quote`.
///
/// Readers either observe a fresh entry or miss: `get` at or past the
/// expiry misses and lazily evicts. Writes overwrite and reset the expiry
/// to `now + ttl`; streaming writes use the same per-source TTL so a
/// disconnected stream's last value still ages out.
#[derive(Debug, Default)]
pub struct QuoteCache {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl QuoteCache {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a fresh quote; expired entries are evicted and miss.
    ///
    /// # Panics
    /// Panics if the cache mutex is poisoned.
    #[must_use]
    pub fn get(&self, source: SourceName, pair: &Pair) -> Option<PriceQuote> {
        let mut entries = self.entries.lock().expect("cache mutex poisoned");
        let key = (source, pair.clone());
        match entries.get(&key) {
            Some(entry) if Instant::now() < entry.expires_at => Some(entry.quote.clone()),
            Some(_) => {
                entries.remove(&key);
                None
            }
            None => None,
        }
    }

    /// Insert a quote, stamping `cached_at` and resetting the expiry.
    ///
    /// # Panics
    /// Panics if the cache mutex is poisoned.
    pub fn insert(&self, mut quote: PriceQuote, ttl: Duration) {
        quote.cached_at = Some(now_ms());
        let key = (quote.source, quote.pair.clone());
        let entry = CacheEntry {
            quote,
            expires_at: Instant::now() + ttl,
        };
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .insert(key, entry);
    }

    /// Drop one entry.
    ///
    /// # Panics
    /// Panics if the cache mutex is poisoned.
    pub fn remove(&self, source: SourceName, pair: &Pair) {
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .remove(&(source, pair.clone()));
    }

    /// Remaining freshness of an entry, if present and fresh.
    ///
    /// # Panics
    /// Panics if the cache mutex is poisoned.
    #[must_use]
    pub fn time_to_expiry(&self, source: SourceName, pair: &Pair) -> Option<Duration> {
        let entries = self.entries.lock().expect("cache mutex poisoned");
        let entry = entries.get(&(source, pair.clone()))?;
        entry.expires_at.checked_duration_since(Instant::now())
    }

    /// Snapshot of all fresh quotes, for the registry endpoints.
    ///
    /// # Panics
    /// Panics if the cache mutex is poisoned.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PriceQuote> {
        let now = Instant::now();
        self.entries
            .lock()
            .expect("cache mutex poisoned")
            .values()
            .filter(|e| now < e.expires_at)
            .map(|e| e.quote.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn quote(price: u32) -> PriceQuote {
        PriceQuote::new(
            Pair::new("BTC", "USD").unwrap(),
            SourceName::Binance,
            Decimal::from(price),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_reads_hit_and_expired_reads_miss() {
        let cache = QuoteCache::new();
        let pair = Pair::new("BTC", "USD").unwrap();
        cache.insert(quote(100), Duration::from_secs(10));

        let hit = cache.get(SourceName::Binance, &pair).unwrap();
        assert_eq!(hit.price, Decimal::from(100));
        assert!(hit.cached_at.is_some());

        tokio::time::advance(Duration::from_millis(9_999)).await;
        assert!(cache.get(SourceName::Binance, &pair).is_some());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(cache.get(SourceName::Binance, &pair).is_none());
        // Lazy eviction: the entry is gone, not just hidden.
        assert!(cache.snapshot().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_resets_expiry() {
        let cache = QuoteCache::new();
        let pair = Pair::new("BTC", "USD").unwrap();
        cache.insert(quote(100), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(8)).await;
        cache.insert(quote(200), Duration::from_secs(10));

        tokio::time::advance(Duration::from_secs(5)).await;
        let hit = cache.get(SourceName::Binance, &pair).unwrap();
        assert_eq!(hit.price, Decimal::from(200));
    }

    #[tokio::test(start_paused = true)]
    async fn keys_are_scoped_per_source() {
        let cache = QuoteCache::new();
        let pair = Pair::new("BTC", "USD").unwrap();
        cache.insert(quote(100), Duration::from_secs(10));
        assert!(cache.get(SourceName::Kraken, &pair).is_none());
        cache.remove(SourceName::Binance, &pair);
        assert!(cache.get(SourceName::Binance, &pair).is_none());
    }
}
