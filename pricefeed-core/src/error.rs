use pricefeed_types::SourceName;
use thiserror::Error;

/// Unified error type for the pricefeed workspace.
///
/// Adapters raise structured variants; the rate limiter consults
/// [`is_retryable`](FeedError::is_retryable) to decide between requeue and
/// surface; the HTTP layer maps each variant onto a response status. The
/// type is `Clone` so single-flight joiners and batched responses can share
/// one outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    /// The upstream has no price for the requested pair.
    #[error("price not found: {what}")]
    PriceNotFound {
        /// Description of the missing price, e.g. "binance BTC/USD".
        what: String,
    },

    /// The upstream rejected our credentials (or none were configured).
    #[error("{source} rejected request: {msg}")]
    Unauthorized {
        /// Source that refused us.
        source: SourceName,
        /// Upstream detail or a hint about the missing key.
        msg: String,
    },

    /// The source is present in config but switched off.
    #[error("source disabled: {source}")]
    SourceDisabled {
        /// The disabled source.
        source: SourceName,
    },

    /// The caller named a source the aggregator does not know.
    #[error("unknown source: {name}")]
    UnknownSource {
        /// The unrecognized name as given.
        name: String,
    },

    /// The upstream answered with a non-2xx status.
    #[error("{source} returned status {status}")]
    UpstreamStatus {
        /// Source that failed.
        source: SourceName,
        /// The HTTP status code.
        status: u16,
    },

    /// Network-level failure before any HTTP status was produced.
    #[error("{source} transport error: {msg}")]
    Transport {
        /// Source that failed.
        source: SourceName,
        /// Human-readable cause.
        msg: String,
    },

    /// The upstream answered 200 but carried a vendor-level error.
    #[error("{source} api error: {msg}")]
    Api {
        /// Source that failed.
        source: SourceName,
        /// The vendor's error message.
        msg: String,
    },

    /// The upstream body did not match the documented shape.
    #[error("{source} returned malformed payload: {msg}")]
    Malformed {
        /// Source that failed.
        source: SourceName,
        /// What was missing or mis-typed.
        msg: String,
    },

    /// The caller-visible request deadline elapsed; the underlying fetch
    /// keeps running and may still populate the cache.
    #[error("request timed out for {source}")]
    RequestTimeout {
        /// Source the request was for.
        source: SourceName,
    },

    /// WebSocket-level failure.
    #[error("{source} stream error: {msg}")]
    Stream {
        /// Source whose stream failed.
        source: SourceName,
        /// Human-readable cause.
        msg: String,
    },

    /// The component is shutting down and no longer admits work.
    #[error("shutting down")]
    ShuttingDown,

    /// Invalid caller input (bad pair, bad argument).
    #[error("invalid argument: {0}")]
    InvalidArg(String),
}

impl FeedError {
    /// Helper: build a `PriceNotFound` for a description of the missing price.
    pub fn price_not_found(what: impl Into<String>) -> Self {
        Self::PriceNotFound { what: what.into() }
    }

    /// Helper: build an `Unauthorized` error.
    pub fn unauthorized(source: SourceName, msg: impl Into<String>) -> Self {
        Self::Unauthorized {
            source,
            msg: msg.into(),
        }
    }

    /// Helper: build a `Transport` error.
    pub fn transport(source: SourceName, msg: impl Into<String>) -> Self {
        Self::Transport {
            source,
            msg: msg.into(),
        }
    }

    /// Helper: build a `Malformed` error.
    pub fn malformed(source: SourceName, msg: impl Into<String>) -> Self {
        Self::Malformed {
            source,
            msg: msg.into(),
        }
    }

    /// Helper: build an `Api` error.
    pub fn api(source: SourceName, msg: impl Into<String>) -> Self {
        Self::Api {
            source,
            msg: msg.into(),
        }
    }

    /// Helper: build a `Stream` error.
    pub fn stream(source: SourceName, msg: impl Into<String>) -> Self {
        Self::Stream {
            source,
            msg: msg.into(),
        }
    }

    /// Whether the rate limiter should requeue the failed job.
    ///
    /// Retryable: network-level failures and HTTP 408, 429 and 5xx.
    /// Everything else (other 4xx, malformed bodies, missing prices, the
    /// caller-visible deadline) surfaces immediately.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::UpstreamStatus { status, .. } => {
                *status == 408 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }

    /// Whether this is an upstream 429.
    #[must_use]
    pub const fn is_rate_limited(&self) -> bool {
        matches!(self, Self::UpstreamStatus { status: 429, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        let src = SourceName::Binance;
        assert!(FeedError::transport(src, "socket hang up").is_retryable());
        for status in [408u16, 429, 500, 502, 503] {
            assert!(
                FeedError::UpstreamStatus {
                    source: src,
                    status
                }
                .is_retryable(),
                "{status} should be retryable"
            );
        }
        for status in [400u16, 403, 404, 422] {
            assert!(
                !FeedError::UpstreamStatus {
                    source: src,
                    status
                }
                .is_retryable(),
                "{status} should not be retryable"
            );
        }
        assert!(!FeedError::price_not_found("x").is_retryable());
        assert!(!FeedError::malformed(src, "bad json").is_retryable());
        assert!(!FeedError::RequestTimeout { source: src }.is_retryable());
    }
}
