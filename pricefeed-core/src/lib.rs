//! pricefeed-core
//!
//! The aggregator framework shared by every source crate and the service:
//!
//! - `adapter`: the `SourceAdapter` trait and capability provider traits.
//! - `error`: the `FeedError` type shared by adapters and orchestrators.
//! - `ratelimit`: per-host token buckets with retry classification.
//! - `http`: the configured HTTP client that submits through a limiter.
//! - `cache`: the TTL-bounded quote cache.
//! - `registry`: tracked pairs with add/remove notifications.
//! - `singleflight`: at-most-one in-flight fetch per key.
//! - `ws`: the reconnecting WebSocket client.
//! - `stream`: subscription bookkeeping shared by streaming adapters.
#![warn(missing_docs)]

pub mod adapter;
pub mod cache;
pub mod error;
pub mod http;
pub mod ratelimit;
pub mod registry;
pub mod singleflight;
pub mod stream;
pub mod ws;

pub use adapter::{
    BatchQuoteProvider, ErrorHandler, QuoteHandler, SourceAdapter, StreamQuoteProvider,
    SubscriptionId,
};
pub use cache::QuoteCache;
pub use error::FeedError;
pub use http::{HttpClient, HttpClientBuilder, HttpResponse};
pub use ratelimit::{LimiterPool, RateLimiter};
pub use registry::PairRegistry;
pub use singleflight::SingleFlight;
pub use stream::{InboundQuote, StreamAdapter, StreamCore, WireProtocol};
pub use ws::{SendLimit, WsClient, WsConfig, WsEvent};
