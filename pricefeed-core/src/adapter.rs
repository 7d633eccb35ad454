use std::sync::Arc;

use async_trait::async_trait;

use crate::FeedError;
use pricefeed_types::{Pair, PriceQuote, SourceName};

/// Opaque identifier for one streaming subscription.
pub type SubscriptionId = u64;

/// Callback invoked for every quote a stream subscription produces.
pub type QuoteHandler = Arc<dyn Fn(PriceQuote) + Send + Sync>;

/// Callback invoked for subscription-level stream errors.
pub type ErrorHandler = Arc<dyn Fn(FeedError) + Send + Sync>;

/// Main contract implemented by every source adapter.
///
/// `fetch_quote` is always present. Batch and streaming are capabilities:
/// the accessor returns a usable trait object only when the source supports
/// them, so the orchestrator discovers what it can do at the type level
/// instead of probing.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// The stable source identity.
    fn name(&self) -> SourceName;

    /// Whether this adapter serves requests.
    fn enabled(&self) -> bool;

    /// Fetch a point-in-time quote for the pair.
    ///
    /// The returned quote preserves the caller's symbols even when the
    /// adapter rewrote them for the upstream.
    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError>;

    /// Advertise batch capability by returning a usable trait object.
    fn as_batch_provider(&self) -> Option<&dyn BatchQuoteProvider> {
        None
    }

    /// Advertise streaming capability by returning a usable trait object.
    fn as_stream_provider(&self) -> Option<&dyn StreamQuoteProvider> {
        None
    }
}

/// Capability trait for sources that can quote several pairs in one call.
#[async_trait]
pub trait BatchQuoteProvider: Send + Sync {
    /// Fetch quotes for a batch of pairs.
    ///
    /// Returns one entry per input pair, in input order, so one pair's
    /// failure never takes its siblings down with it.
    async fn fetch_quotes(&self, pairs: &[Pair]) -> Vec<Result<PriceQuote, FeedError>>;

    /// Upper bound on pairs per upstream call, if the vendor imposes one.
    fn max_batch_size(&self) -> Option<usize> {
        None
    }
}

/// Capability trait for sources with a streaming (WebSocket) feed.
///
/// The underlying connection is created lazily on first subscribe and torn
/// down by [`shutdown`](StreamQuoteProvider::shutdown). A wire identifier is
/// subscribed exactly while at least one subscription references it.
#[async_trait]
pub trait StreamQuoteProvider: Send + Sync {
    /// Subscribe a single pair. The handler runs for every inbound quote.
    async fn subscribe(
        &self,
        pair: &Pair,
        on_quote: QuoteHandler,
        on_error: Option<ErrorHandler>,
    ) -> Result<SubscriptionId, FeedError>;

    /// Subscribe many pairs, issuing the wire subscriptions in one batched
    /// operation (chunked when the source configures a batch size).
    async fn subscribe_many(
        &self,
        pairs: &[Pair],
        on_quote: QuoteHandler,
    ) -> Result<Vec<SubscriptionId>, FeedError>;

    /// Drop one subscription; unsubscribes the wire identifier when this
    /// was the last reference to it.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), FeedError>;

    /// Drop every subscription and unsubscribe all wire identifiers.
    async fn unsubscribe_all(&self) -> Result<(), FeedError>;

    /// Close the connection and stop reconnecting.
    async fn shutdown(&self);
}
