//! The public quote entry point.
//!
//! `get_quote` serves from the cache when fresh, otherwise starts (or
//! joins) the single in-flight fetch for the `(source, pair)` key, bounded
//! by the request deadline. A deadline expiry surfaces to the caller while
//! the fetch keeps running and still populates the cache, so the next
//! identical request hits.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tracing::debug;

use pricefeed_core::{FeedError, PairRegistry, QuoteCache, SingleFlight, SourceAdapter};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

struct Inner {
    adapters: HashMap<SourceName, Arc<dyn SourceAdapter>>,
    configs: HashMap<SourceName, SourceConfig>,
    cache: Arc<QuoteCache>,
    registry: Arc<PairRegistry>,
    flight: SingleFlight<(SourceName, Pair), PriceQuote>,
    request_timeout: Duration,
}

/// Builder for [`QuoteOrchestrator`].
pub struct OrchestratorBuilder {
    adapters: HashMap<SourceName, Arc<dyn SourceAdapter>>,
    configs: HashMap<SourceName, SourceConfig>,
    cache: Option<Arc<QuoteCache>>,
    registry: Option<Arc<PairRegistry>>,
    request_timeout: Duration,
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl OrchestratorBuilder {
    /// Start an empty builder with the default 10 s request deadline.
    #[must_use]
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
            configs: HashMap::new(),
            cache: None,
            registry: None,
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Register an adapter together with its source config.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn SourceAdapter>, cfg: SourceConfig) -> Self {
        let name = adapter.name();
        self.adapters.insert(name, adapter);
        self.configs.insert(name, cfg);
        self
    }

    /// Register a source that is configured but switched off; requests for
    /// it answer `SourceDisabled` instead of `UnknownSource`.
    #[must_use]
    pub fn with_disabled(mut self, source: SourceName, cfg: SourceConfig) -> Self {
        self.configs.insert(source, cfg);
        self
    }

    /// Share a cache (defaults to a fresh one).
    #[must_use]
    pub fn cache(mut self, cache: Arc<QuoteCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share a registry (defaults to a fresh one).
    #[must_use]
    pub fn registry(mut self, registry: Arc<PairRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Caller-visible request deadline.
    #[must_use]
    pub const fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Build the orchestrator.
    #[must_use]
    pub fn build(self) -> QuoteOrchestrator {
        QuoteOrchestrator {
            inner: Arc::new(Inner {
                adapters: self.adapters,
                configs: self.configs,
                cache: self.cache.unwrap_or_default(),
                registry: self.registry.unwrap_or_else(|| Arc::new(PairRegistry::new())),
                flight: SingleFlight::new(),
                request_timeout: self.request_timeout,
            }),
        }
    }
}

/// Routes quote requests to source adapters with caching, dedup and a
/// request deadline.
#[derive(Clone)]
pub struct QuoteOrchestrator {
    inner: Arc<Inner>,
}

impl QuoteOrchestrator {
    /// Start building an orchestrator.
    #[must_use]
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// The shared cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<QuoteCache> {
        &self.inner.cache
    }

    /// The shared registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<PairRegistry> {
        &self.inner.registry
    }

    /// Per-source configs as registered.
    #[must_use]
    pub fn configs(&self) -> &HashMap<SourceName, SourceConfig> {
        &self.inner.configs
    }

    /// Registered adapters.
    #[must_use]
    pub fn adapters(&self) -> &HashMap<SourceName, Arc<dyn SourceAdapter>> {
        &self.inner.adapters
    }

    fn entry(&self, source: SourceName) -> Result<(&Arc<dyn SourceAdapter>, &SourceConfig), FeedError> {
        let cfg = self
            .inner
            .configs
            .get(&source)
            .ok_or_else(|| FeedError::UnknownSource {
                name: source.to_string(),
            })?;
        if !cfg.enabled {
            return Err(FeedError::SourceDisabled { source });
        }
        let adapter = self
            .inner
            .adapters
            .get(&source)
            .ok_or_else(|| FeedError::UnknownSource {
                name: source.to_string(),
            })?;
        if !adapter.enabled() {
            return Err(FeedError::SourceDisabled { source });
        }
        Ok((adapter, cfg))
    }

    /// Serve one quote: fresh cache entry, or a deduplicated fetch bounded
    /// by the request deadline.
    ///
    /// # Errors
    /// `UnknownSource`/`SourceDisabled` on routing, `RequestTimeout` when
    /// the deadline lapses, otherwise whatever the adapter raised.
    pub async fn get_quote(
        &self,
        source: SourceName,
        pair: &Pair,
    ) -> Result<PriceQuote, FeedError> {
        self.entry(source)?;
        self.inner.registry.track_request(source, pair);

        if let Some(hit) = self.inner.cache.get(source, pair) {
            debug!(target = "pricefeed::orchestrator", %source, %pair, "cache hit");
            return Ok(hit);
        }

        let flight = self.start_fetch(source, pair);
        match tokio::time::timeout(self.inner.request_timeout, flight).await {
            Ok(outcome) => outcome,
            Err(_) => Err(FeedError::RequestTimeout { source }),
        }
    }

    /// Revalidate a pair, bypassing the cache read. Used by the refetch
    /// loop; shares the single-flight key with caller fetches.
    ///
    /// # Errors
    /// As [`get_quote`](Self::get_quote), without the deadline.
    pub async fn refresh(&self, source: SourceName, pair: &Pair) -> Result<PriceQuote, FeedError> {
        self.entry(source)?;
        self.start_fetch(source, pair).await
    }

    fn start_fetch(
        &self,
        source: SourceName,
        pair: &Pair,
    ) -> impl Future<Output = Result<PriceQuote, FeedError>> {
        let inner = Arc::clone(&self.inner);
        let key = (source, pair.clone());
        let pair = pair.clone();
        self.inner
            .flight
            .run(key, async move { fetch_and_store(&inner, source, &pair).await })
    }

    /// Serve a batch for one source, preserving input positions.
    ///
    /// Duplicate pairs are deduplicated at the fetch layer; every input
    /// position is answered. When the adapter supports batching, all cache
    /// misses go upstream in one `fetch_quotes` call (the adapter chunks by
    /// its own batch bound); otherwise pairs fan out per-pair, bounded by
    /// the source's limiter. The request deadline frees only the caller's
    /// wait: the upstream call keeps running and still populates the cache.
    pub async fn get_quotes(
        &self,
        source: SourceName,
        pairs: &[Pair],
    ) -> Vec<Result<PriceQuote, FeedError>> {
        let adapter = match self.entry(source) {
            Ok((adapter, _)) => adapter,
            Err(err) => return pairs.iter().map(|_| Err(err.clone())).collect(),
        };

        let mut uniques: Vec<Pair> = Vec::new();
        for pair in pairs {
            if !uniques.contains(pair) {
                uniques.push(pair.clone());
            }
        }
        for pair in &uniques {
            self.inner.registry.track_request(source, pair);
        }

        let mut by_pair: HashMap<Pair, Result<PriceQuote, FeedError>> = HashMap::new();

        if adapter.as_batch_provider().is_some() {
            let mut to_fetch: Vec<Pair> = Vec::new();
            for pair in &uniques {
                if let Some(hit) = self.inner.cache.get(source, pair) {
                    by_pair.insert(pair.clone(), Ok(hit));
                } else {
                    to_fetch.push(pair.clone());
                }
            }
            if !to_fetch.is_empty() {
                for pair in &to_fetch {
                    self.inner.registry.track_fetch(source, pair);
                }

                // One upstream batch call, spawned so a caller deadline
                // never cancels it; each pair's outcome fans out through
                // its single-flight key, and the keyed producer stores the
                // quote even after the caller's wait is gone.
                let mut outcome_rxs = Vec::with_capacity(to_fetch.len());
                let mut outcome_txs: HashMap<
                    Pair,
                    oneshot::Sender<Result<PriceQuote, FeedError>>,
                > = HashMap::new();
                for pair in &to_fetch {
                    let (tx, rx) = oneshot::channel();
                    outcome_txs.insert(pair.clone(), tx);
                    outcome_rxs.push(rx);
                }
                {
                    let inner = Arc::clone(&self.inner);
                    let batch_pairs = to_fetch.clone();
                    tokio::spawn(async move {
                        let Some(batch) = inner
                            .adapters
                            .get(&source)
                            .and_then(|a| a.as_batch_provider())
                        else {
                            return;
                        };
                        let outcomes = batch.fetch_quotes(&batch_pairs).await;
                        for (pair, outcome) in batch_pairs.into_iter().zip(outcomes) {
                            if let Some(tx) = outcome_txs.remove(&pair) {
                                let _ = tx.send(outcome);
                            }
                        }
                    });
                }

                let joins = to_fetch.iter().zip(outcome_rxs).map(|(pair, rx)| {
                    let inner = Arc::clone(&self.inner);
                    let key = (source, pair.clone());
                    let pair = pair.clone();
                    self.inner.flight.run(key, async move {
                        let quote = rx
                            .await
                            .unwrap_or(Err(FeedError::ShuttingDown))?;
                        let ttl = inner
                            .configs
                            .get(&source)
                            .map_or(Duration::from_secs(10), SourceConfig::ttl);
                        inner.cache.insert(quote.clone(), ttl);
                        inner.registry.track_success(source, &pair);
                        Ok(quote)
                    })
                });
                match tokio::time::timeout(
                    self.inner.request_timeout,
                    futures::future::join_all(joins),
                )
                .await
                {
                    Ok(outcomes) => {
                        for (pair, outcome) in to_fetch.into_iter().zip(outcomes) {
                            by_pair.insert(pair, outcome);
                        }
                    }
                    Err(_) => {
                        for pair in to_fetch {
                            by_pair.insert(pair, Err(FeedError::RequestTimeout { source }));
                        }
                    }
                }
            }
        } else {
            let fetches = uniques
                .iter()
                .map(|pair| self.get_quote(source, pair));
            let outcomes = futures::future::join_all(fetches).await;
            for (pair, outcome) in uniques.iter().zip(outcomes) {
                by_pair.insert(pair.clone(), outcome);
            }
        }

        pairs
            .iter()
            .map(|pair| {
                by_pair.get(pair).cloned().unwrap_or_else(|| {
                    Err(FeedError::price_not_found(format!("{source} {pair}")))
                })
            })
            .collect()
    }
}

async fn fetch_and_store(
    inner: &Inner,
    source: SourceName,
    pair: &Pair,
) -> Result<PriceQuote, FeedError> {
    let adapter = inner
        .adapters
        .get(&source)
        .ok_or_else(|| FeedError::UnknownSource {
            name: source.to_string(),
        })?;
    let cfg = inner
        .configs
        .get(&source)
        .ok_or_else(|| FeedError::UnknownSource {
            name: source.to_string(),
        })?;

    inner.registry.track_fetch(source, pair);
    let quote = adapter.fetch_quote(pair).await?;
    inner.cache.insert(quote.clone(), cfg.ttl());
    inner.registry.track_success(source, pair);
    Ok(quote)
}
