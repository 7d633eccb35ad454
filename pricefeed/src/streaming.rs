//! Bridges the pair registry to the streaming adapters.
//!
//! Pair additions do not subscribe immediately: they land in a per-source
//! pending set drained by a 100 ms debounce, so a burst of additions
//! becomes one batched wire subscription. Inbound quotes from every stream
//! feed one batch processor that writes to the cache (same per-source TTL
//! as REST) and marks fetch success in the registry; the batch is bounded
//! by size and time and flushed synchronously on shutdown.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use pricefeed_core::{
    PairRegistry, QuoteCache, QuoteHandler, SourceAdapter, SubscriptionId,
};
use pricefeed_types::{Pair, PriceQuote, RegistryEvent, SourceConfig, SourceName};

const DEBOUNCE: Duration = Duration::from_millis(100);
const BATCH_MAX: usize = 64;
const FLUSH_INTERVAL: Duration = Duration::from_millis(250);

/// Everything the streaming service needs at spawn time.
pub struct StreamingQuotesService {
    adapters: HashMap<SourceName, Arc<dyn SourceAdapter>>,
    configs: HashMap<SourceName, SourceConfig>,
    cache: Arc<QuoteCache>,
    registry: Arc<PairRegistry>,
    events: broadcast::Receiver<RegistryEvent>,
}

impl StreamingQuotesService {
    /// Build the service over the streaming-capable subset of `adapters`.
    #[must_use]
    pub fn new(
        adapters: HashMap<SourceName, Arc<dyn SourceAdapter>>,
        configs: HashMap<SourceName, SourceConfig>,
        cache: Arc<QuoteCache>,
        registry: Arc<PairRegistry>,
    ) -> Self {
        let adapters = adapters
            .into_iter()
            .filter(|(source, adapter)| {
                let streaming = adapter.as_stream_provider().is_some();
                let enabled = configs.get(source).is_some_and(|c| c.enabled);
                streaming && enabled
            })
            .collect();
        // Subscribe at construction so no event between wiring and spawn
        // slips by.
        let events = registry.subscribe();
        Self {
            adapters,
            configs,
            cache,
            registry,
            events,
        }
    }

    /// Spawn the bridge task. Stops (flushing its batch) when `stop` flips
    /// to `true`.
    pub fn spawn(self, stop: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(stop))
    }

    fn ttl_for(&self, source: SourceName) -> Duration {
        self.configs
            .get(&source)
            .map_or(Duration::from_secs(10), SourceConfig::ttl)
    }

    fn flush(&self, batch: &mut Vec<PriceQuote>) {
        if batch.is_empty() {
            return;
        }
        debug!(
            target = "pricefeed::streaming",
            quotes = batch.len(),
            "flushing quote batch"
        );
        for quote in batch.drain(..) {
            let source = quote.source;
            let pair = quote.pair.clone();
            self.cache.insert(quote, self.ttl_for(source));
            self.registry.track_success(source, &pair);
        }
    }

    async fn subscribe_set(
        &self,
        source: SourceName,
        pairs: Vec<Pair>,
        handler: &QuoteHandler,
        subs: &mut HashMap<(SourceName, Pair), Vec<SubscriptionId>>,
    ) {
        let Some(adapter) = self.adapters.get(&source) else {
            return;
        };
        let Some(stream) = adapter.as_stream_provider() else {
            return;
        };
        match stream.subscribe_many(&pairs, Arc::clone(handler)).await {
            Ok(ids) => {
                for (pair, id) in pairs.iter().zip(ids) {
                    subs.entry((source, pair.clone())).or_default().push(id);
                }
                debug!(
                    target = "pricefeed::streaming",
                    %source,
                    pairs = pairs.len(),
                    "subscribed pairs"
                );
            }
            Err(err) => {
                warn!(
                    target = "pricefeed::streaming",
                    %source,
                    %err,
                    "batched subscribe failed"
                );
            }
        }
    }

    #[allow(clippy::too_many_lines)]
    async fn run(mut self, mut stop: watch::Receiver<bool>) {
        let (quote_tx, mut quote_rx) = mpsc::unbounded_channel::<PriceQuote>();
        let handler: QuoteHandler = Arc::new(move |quote| {
            let _ = quote_tx.send(quote);
        });

        let mut subs: HashMap<(SourceName, Pair), Vec<SubscriptionId>> = HashMap::new();
        let mut events = std::mem::replace(&mut self.events, self.registry.subscribe());

        // Initial subscriptions for everything already tracked.
        let sources: Vec<SourceName> = self.adapters.keys().copied().collect();
        for source in sources {
            let pairs = self.registry.pairs_for(source);
            if !pairs.is_empty() {
                self.subscribe_set(source, pairs, &handler, &mut subs).await;
            }
        }

        let mut pending: HashMap<SourceName, (HashSet<Pair>, Instant)> = HashMap::new();
        let mut batch: Vec<PriceQuote> = Vec::new();
        let mut flush_tick = tokio::time::interval(FLUSH_INTERVAL);
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            let next_deadline = pending.values().map(|(_, at)| *at).min();
            tokio::select! {
                _ = stop.changed() => {
                    if *stop.borrow() {
                        break;
                    }
                }
                event = events.recv() => match event {
                    Ok(RegistryEvent::PairAdded { source, pair }) => {
                        if self.adapters.contains_key(&source) {
                            let entry = pending
                                .entry(source)
                                .or_insert_with(|| (HashSet::new(), Instant::now() + DEBOUNCE));
                            entry.0.insert(pair);
                            // Re-arm: a burst keeps collapsing into one batch.
                            entry.1 = Instant::now() + DEBOUNCE;
                        }
                    }
                    Ok(RegistryEvent::PairRemoved { source, pair }) => {
                        if let Some((set, _)) = pending.get_mut(&source) {
                            set.remove(&pair);
                        }
                        if let Some(ids) = subs.remove(&(source, pair)) {
                            if let Some(stream) = self
                                .adapters
                                .get(&source)
                                .and_then(|a| a.as_stream_provider())
                            {
                                for id in ids {
                                    if let Err(err) = stream.unsubscribe(id).await {
                                        warn!(
                                            target = "pricefeed::streaming",
                                            %source,
                                            %err,
                                            "unsubscribe failed"
                                        );
                                    }
                                }
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(
                            target = "pricefeed::streaming",
                            missed,
                            "registry event stream lagged"
                        );
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                },
                () = async { tokio::time::sleep_until(next_deadline.unwrap()).await },
                    if next_deadline.is_some() =>
                {
                    let now = Instant::now();
                    let due: Vec<SourceName> = pending
                        .iter()
                        .filter(|(_, (_, at))| *at <= now)
                        .map(|(source, _)| *source)
                        .collect();
                    for source in due {
                        if let Some((set, _)) = pending.remove(&source) {
                            let pairs: Vec<Pair> = set.into_iter().collect();
                            if !pairs.is_empty() {
                                self.subscribe_set(source, pairs, &handler, &mut subs).await;
                            }
                        }
                    }
                }
                quote = quote_rx.recv() => {
                    if let Some(quote) = quote {
                        batch.push(quote);
                        if batch.len() >= BATCH_MAX {
                            self.flush(&mut batch);
                        }
                    }
                }
                _ = flush_tick.tick() => {
                    self.flush(&mut batch);
                }
            }
        }

        // Shutdown: drain and flush synchronously, then tear streams down.
        while let Ok(quote) = quote_rx.try_recv() {
            batch.push(quote);
        }
        self.flush(&mut batch);
        for adapter in self.adapters.values() {
            if let Some(stream) = adapter.as_stream_provider() {
                if let Err(err) = stream.unsubscribe_all().await {
                    debug!(target = "pricefeed::streaming", %err, "unsubscribe_all failed");
                }
                stream.shutdown().await;
            }
        }
    }
}
