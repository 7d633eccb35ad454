//! Subscription bookkeeping shared by every streaming adapter.
//!
//! [`StreamCore`] owns the maps that make the streaming invariants hold: a
//! wire identifier is subscribed exactly while at least one subscription
//! references it, and on reconnect the full identifier set is restored in
//! one batched operation. Vendor framing lives behind [`WireProtocol`], so
//! source crates only describe their wire dialect.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rust_decimal::Decimal;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, warn};

use crate::adapter::{ErrorHandler, QuoteHandler, StreamQuoteProvider, SubscriptionId};
use crate::ws::{WsClient, WsConfig, WsEvent};
use crate::FeedError;
use pricefeed_types::{Pair, PriceQuote, SourceName, StreamOptions};

/// A price reading extracted from one inbound stream frame, keyed by the
/// wire identifier; the pair is resolved by the subscription maps.
#[derive(Debug, Clone)]
pub struct InboundQuote {
    /// The source's wire key for the pair.
    pub identifier: String,
    /// The price carried by the frame.
    pub price: Decimal,
    /// Upstream emission instant, epoch milliseconds.
    pub received_at: i64,
}

/// Vendor-specific wire dialect of one streaming source.
pub trait WireProtocol: Send + Sync + 'static {
    /// The source this protocol speaks for.
    fn source(&self) -> SourceName;

    /// The WebSocket endpoint to dial.
    fn endpoint(&self) -> String;

    /// The wire key the source uses for a pair (e.g. `btcusdt@trade`,
    /// `XBT/USD`, `BTC-USD`).
    fn identifier(&self, pair: &Pair) -> String;

    /// Serialized subscribe frames covering `idents`. Most sources batch
    /// every identifier into one frame; some need one frame each.
    fn subscribe_frames(&self, idents: &[String]) -> Vec<String>;

    /// Serialized unsubscribe frames covering `idents`.
    fn unsubscribe_frames(&self, idents: &[String]) -> Vec<String>;

    /// Extract a quote from an inbound JSON frame, if it carries one.
    fn parse(&self, msg: &serde_json::Value) -> Option<InboundQuote>;

    /// Vendor ping convention, when the endpoint wants a text heartbeat
    /// instead of a WebSocket ping frame.
    fn heartbeat_text(&self) -> Option<String> {
        None
    }
}

struct Subscription {
    pair: Pair,
    identifier: String,
    on_quote: QuoteHandler,
    on_error: Option<ErrorHandler>,
}

#[derive(Default)]
struct CoreState {
    subscriptions: HashMap<SubscriptionId, Subscription>,
    subscribed: HashSet<String>,
    identifier_to_pair: HashMap<String, Pair>,
}

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Mutex-guarded subscription state for one streaming source.
pub struct StreamCore {
    source: SourceName,
    state: Mutex<CoreState>,
}

impl StreamCore {
    /// Create empty bookkeeping for `source`.
    #[must_use]
    pub fn new(source: SourceName) -> Self {
        Self {
            source,
            state: Mutex::new(CoreState::default()),
        }
    }

    fn next_id() -> SubscriptionId {
        NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed)
    }

    /// Register subscriptions for `pairs`. Returns the new subscription ids
    /// and the identifiers that still need a wire subscribe.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    pub fn add_many(
        &self,
        pairs: &[(Pair, String)],
        on_quote: &QuoteHandler,
        on_error: Option<&ErrorHandler>,
    ) -> (Vec<SubscriptionId>, Vec<String>) {
        let mut state = self.state.lock().expect("stream state mutex poisoned");
        let mut ids = Vec::with_capacity(pairs.len());
        let mut new_idents = Vec::new();
        for (pair, identifier) in pairs {
            let id = Self::next_id();
            state.subscriptions.insert(
                id,
                Subscription {
                    pair: pair.clone(),
                    identifier: identifier.clone(),
                    on_quote: Arc::clone(on_quote),
                    on_error: on_error.map(Arc::clone),
                },
            );
            if state.identifier_to_pair.insert(identifier.clone(), pair.clone()).is_none()
                && !state.subscribed.contains(identifier)
                && !new_idents.contains(identifier)
            {
                new_idents.push(identifier.clone());
            }
            ids.push(id);
        }
        (ids, new_idents)
    }

    /// Drop one subscription. Returns the wire identifier to unsubscribe
    /// when this was the last reference to it.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    pub fn remove(&self, id: SubscriptionId) -> Option<String> {
        let mut state = self.state.lock().expect("stream state mutex poisoned");
        let removed = state.subscriptions.remove(&id)?;
        let still_referenced = state
            .subscriptions
            .values()
            .any(|s| s.identifier == removed.identifier);
        if still_referenced {
            return None;
        }
        state.identifier_to_pair.remove(&removed.identifier);
        state.subscribed.remove(&removed.identifier);
        Some(removed.identifier)
    }

    /// Drop a set of subscriptions without touching wire state; used to
    /// roll back a failed batched subscribe.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    pub fn rollback(&self, ids: &[SubscriptionId]) {
        let mut state = self.state.lock().expect("stream state mutex poisoned");
        for id in ids {
            if let Some(sub) = state.subscriptions.remove(id) {
                let still_referenced = state
                    .subscriptions
                    .values()
                    .any(|s| s.identifier == sub.identifier);
                if !still_referenced {
                    state.identifier_to_pair.remove(&sub.identifier);
                    state.subscribed.remove(&sub.identifier);
                }
            }
        }
    }

    /// Drop every subscription. Returns the identifiers that were
    /// subscribed on the wire.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    pub fn remove_all(&self) -> Vec<String> {
        let mut state = self.state.lock().expect("stream state mutex poisoned");
        state.subscriptions.clear();
        state.identifier_to_pair.clear();
        state.subscribed.drain().collect()
    }

    /// Mark identifiers as subscribed on the wire.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    pub fn mark_subscribed(&self, idents: &[String]) {
        let mut state = self.state.lock().expect("stream state mutex poisoned");
        for ident in idents {
            state.subscribed.insert(ident.clone());
        }
    }

    /// Take the subscribed set, leaving it empty; used at the start of a
    /// resubscription so a failure can restore it.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    #[must_use]
    pub fn take_subscribed(&self) -> HashSet<String> {
        let mut state = self.state.lock().expect("stream state mutex poisoned");
        std::mem::take(&mut state.subscribed)
    }

    /// Restore a previously taken subscribed set after a failed
    /// resubscription, so a retry starts from a correct picture.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    pub fn restore_subscribed(&self, set: HashSet<String>) {
        let mut state = self.state.lock().expect("stream state mutex poisoned");
        state.subscribed = set;
    }

    /// Snapshot of the identifiers currently subscribed on the wire.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    #[must_use]
    pub fn subscribed_identifiers(&self) -> Vec<String> {
        let state = self.state.lock().expect("stream state mutex poisoned");
        let mut idents: Vec<_> = state.subscribed.iter().cloned().collect();
        idents.sort();
        idents
    }

    /// Number of live subscriptions.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    #[must_use]
    pub fn subscription_count(&self) -> usize {
        self.state
            .lock()
            .expect("stream state mutex poisoned")
            .subscriptions
            .len()
    }

    /// Fan an inbound quote out to every subscription of its identifier.
    /// Returns how many handlers ran.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    pub fn emit(&self, inbound: &InboundQuote) -> usize {
        let (pair, handlers) = {
            let state = self.state.lock().expect("stream state mutex poisoned");
            let Some(pair) = state.identifier_to_pair.get(&inbound.identifier).cloned() else {
                return 0;
            };
            let handlers: Vec<QuoteHandler> = state
                .subscriptions
                .values()
                .filter(|s| s.identifier == inbound.identifier)
                .map(|s| Arc::clone(&s.on_quote))
                .collect();
            (pair, handlers)
        };
        let quote = PriceQuote {
            pair,
            source: self.source,
            price: inbound.price,
            received_at: inbound.received_at,
            cached_at: None,
        };
        for handler in &handlers {
            handler(quote.clone());
        }
        handlers.len()
    }

    /// Deliver a stream-level error to every subscription that asked for
    /// error callbacks.
    ///
    /// # Panics
    /// Panics if the state mutex is poisoned.
    pub fn emit_error(&self, err: &FeedError) {
        let handlers: Vec<ErrorHandler> = {
            let state = self.state.lock().expect("stream state mutex poisoned");
            state
                .subscriptions
                .values()
                .filter_map(|s| s.on_error.as_ref().map(Arc::clone))
                .collect()
        };
        for handler in &handlers {
            handler(err.clone());
        }
    }
}

/// Streaming adapter generic over a vendor [`WireProtocol`].
///
/// The connection is created lazily on first subscribe; a reader task
/// routes inbound frames through the protocol into the subscription maps
/// and replays the full identifier set after every reconnect.
pub struct StreamAdapter<P: WireProtocol> {
    protocol: Arc<P>,
    opts: StreamOptions,
    core: Arc<StreamCore>,
    conn: AsyncMutex<Option<WsClient>>,
    // Serializes wire-level subscribe/unsubscribe so batches do not interleave.
    wire: AsyncMutex<()>,
}

impl<P: WireProtocol> StreamAdapter<P> {
    /// Build an adapter for `protocol` with per-source stream options.
    #[must_use]
    pub fn new(protocol: P, opts: StreamOptions) -> Self {
        let source = protocol.source();
        Self {
            protocol: Arc::new(protocol),
            opts,
            core: Arc::new(StreamCore::new(source)),
            conn: AsyncMutex::new(None),
            wire: AsyncMutex::new(()),
        }
    }

    /// The bookkeeping core, exposed for tests and diagnostics.
    #[must_use]
    pub fn core(&self) -> &Arc<StreamCore> {
        &self.core
    }

    /// Watch connection state changes. `None` until the lazy connection
    /// has been created by a first subscribe.
    pub async fn connection_state(&self) -> Option<tokio::sync::watch::Receiver<pricefeed_types::ConnectionState>> {
        self.conn.lock().await.as_ref().map(WsClient::state_watch)
    }

    fn ws_config(&self) -> WsConfig {
        let mut cfg = WsConfig::from_stream_options(self.protocol.endpoint(), &self.opts);
        cfg.heartbeat_text = self.protocol.heartbeat_text();
        cfg
    }

    async fn ensure_connected(&self) -> WsClient {
        let mut guard = self.conn.lock().await;
        if let Some(client) = guard.as_ref() {
            return client.clone();
        }
        let source = self.protocol.source();
        let (client, events) = WsClient::spawn(source, self.ws_config());
        tokio::spawn(read_events(
            events,
            client.clone(),
            Arc::clone(&self.core),
            Arc::clone(&self.protocol),
            self.opts.batch_size,
        ));
        *guard = Some(client.clone());
        client
    }

    fn frames_for(&self, idents: &[String], subscribe: bool) -> Vec<String> {
        chunk_frames(self.protocol.as_ref(), idents, self.opts.batch_size, subscribe)
    }
}

fn chunk_frames<P: WireProtocol + ?Sized>(
    protocol: &P,
    idents: &[String],
    batch_size: Option<usize>,
    subscribe: bool,
) -> Vec<String> {
    let chunks: Vec<&[String]> = match batch_size {
        Some(n) if n > 0 => idents.chunks(n).collect(),
        _ => vec![idents],
    };
    chunks
        .into_iter()
        .filter(|chunk| !chunk.is_empty())
        .flat_map(|chunk| {
            if subscribe {
                protocol.subscribe_frames(chunk)
            } else {
                protocol.unsubscribe_frames(chunk)
            }
        })
        .collect()
}

async fn read_events<P: WireProtocol>(
    mut events: tokio::sync::mpsc::Receiver<WsEvent>,
    client: WsClient,
    core: Arc<StreamCore>,
    protocol: Arc<P>,
    batch_size: Option<usize>,
) {
    let source = protocol.source();
    while let Some(event) = events.recv().await {
        match event {
            WsEvent::Message(value) => {
                if let Some(inbound) = protocol.parse(&value) {
                    if core.emit(&inbound) == 0 {
                        debug!(
                            target = "pricefeed::stream",
                            %source,
                            identifier = %inbound.identifier,
                            "dropping quote for unsubscribed identifier"
                        );
                    }
                }
            }
            WsEvent::Reconnected => {
                let prev = core.take_subscribed();
                if prev.is_empty() {
                    continue;
                }
                let mut idents: Vec<String> = prev.iter().cloned().collect();
                idents.sort();
                let frames = chunk_frames(protocol.as_ref(), &idents, batch_size, true);
                let mut failed = false;
                for frame in frames {
                    if client.send(frame).await.is_err() {
                        failed = true;
                        break;
                    }
                }
                if failed {
                    warn!(target = "pricefeed::stream", %source, "resubscription failed");
                    core.restore_subscribed(prev);
                    core.emit_error(&FeedError::stream(source, "resubscription failed"));
                } else {
                    core.mark_subscribed(&idents);
                    debug!(
                        target = "pricefeed::stream",
                        %source,
                        identifiers = idents.len(),
                        "resubscribed after reconnect"
                    );
                }
            }
            WsEvent::Error(msg) => {
                core.emit_error(&FeedError::stream(source, msg));
            }
            WsEvent::Open | WsEvent::Text(_) => {}
            WsEvent::Closed => break,
        }
    }
}

#[async_trait]
impl<P: WireProtocol> StreamQuoteProvider for StreamAdapter<P> {
    async fn subscribe(
        &self,
        pair: &Pair,
        on_quote: QuoteHandler,
        on_error: Option<ErrorHandler>,
    ) -> Result<SubscriptionId, FeedError> {
        let client = self.ensure_connected().await;
        let _wire = self.wire.lock().await;
        let ident = self.protocol.identifier(pair);
        let (ids, new_idents) =
            self.core
                .add_many(&[(pair.clone(), ident)], &on_quote, on_error.as_ref());
        if !new_idents.is_empty() {
            for frame in self.frames_for(&new_idents, true) {
                if let Err(err) = client.send(frame).await {
                    self.core.rollback(&ids);
                    return Err(err);
                }
            }
            self.core.mark_subscribed(&new_idents);
        }
        Ok(ids[0])
    }

    async fn subscribe_many(
        &self,
        pairs: &[Pair],
        on_quote: QuoteHandler,
    ) -> Result<Vec<SubscriptionId>, FeedError> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let client = self.ensure_connected().await;
        let _wire = self.wire.lock().await;
        let items: Vec<(Pair, String)> = pairs
            .iter()
            .map(|p| (p.clone(), self.protocol.identifier(p)))
            .collect();
        let (ids, new_idents) = self.core.add_many(&items, &on_quote, None);
        if !new_idents.is_empty() {
            for frame in self.frames_for(&new_idents, true) {
                if let Err(err) = client.send(frame).await {
                    self.core.rollback(&ids);
                    return Err(err);
                }
            }
            self.core.mark_subscribed(&new_idents);
        }
        Ok(ids)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), FeedError> {
        let _wire = self.wire.lock().await;
        if let Some(ident) = self.core.remove(id) {
            let conn = self.conn.lock().await;
            if let Some(client) = conn.as_ref() {
                for frame in self.frames_for(&[ident.clone()], false) {
                    client.send(frame).await?;
                }
            }
        }
        Ok(())
    }

    async fn unsubscribe_all(&self) -> Result<(), FeedError> {
        let _wire = self.wire.lock().await;
        let idents = self.core.remove_all();
        if idents.is_empty() {
            return Ok(());
        }
        let conn = self.conn.lock().await;
        if let Some(client) = conn.as_ref() {
            for frame in self.frames_for(&idents, false) {
                client.send(frame).await?;
            }
        }
        Ok(())
    }

    async fn shutdown(&self) {
        let mut conn = self.conn.lock().await;
        if let Some(client) = conn.take() {
            client.close().await;
        }
    }
}
