//! pricefeed-sources
//!
//! One adapter per supported provider, each normalizing the vendor's REST
//! (and, where available, WebSocket) surface into the common
//! `SourceAdapter` contract. Symbol rewrites (`USD` -> `USDT` on Binance
//! and OKX, `BTC` -> `XBT` on Kraken) stay internal: returned quotes always
//! carry the caller's symbols.

mod alphavantage;
mod binance;
mod coinbase;
mod coingecko;
mod cryptocompare;
mod exchangerate_host;
mod finnhub;
mod frankfurter;
mod kraken;
mod okx;
pub mod ws;

use std::sync::Arc;

use pricefeed_core::{FeedError, HttpClient, LimiterPool, SourceAdapter};
use pricefeed_types::{ProxySetting, SourceConfig, SourceName};

pub use alphavantage::AlphaVantage;
pub use binance::Binance;
pub use coinbase::Coinbase;
pub use coingecko::Coingecko;
pub use cryptocompare::Cryptocompare;
pub use exchangerate_host::ExchangerateHost;
pub use finnhub::Finnhub;
pub use frankfurter::Frankfurter;
pub use kraken::Kraken;
pub use okx::Okx;

/// Build the adapter for `name` from its config.
///
/// # Errors
/// Returns `InvalidArg` when the configured URLs are unparsable.
pub fn build_adapter(
    name: SourceName,
    cfg: &SourceConfig,
    pool: &LimiterPool,
) -> Result<Arc<dyn SourceAdapter>, FeedError> {
    tracing::debug!(
        target = "pricefeed::sources",
        source = %name,
        rps = cfg.rps,
        max_concurrent = cfg.max_concurrent,
        refetch = cfg.refetch,
        "building adapter"
    );
    Ok(match name {
        SourceName::AlphaVantage => Arc::new(AlphaVantage::new(cfg, pool)?),
        SourceName::Binance => Arc::new(Binance::new(cfg, pool)?),
        SourceName::Coinbase => Arc::new(Coinbase::new(cfg, pool)?),
        SourceName::Coingecko => Arc::new(Coingecko::new(cfg, pool)?),
        SourceName::Cryptocompare => Arc::new(Cryptocompare::new(cfg, pool)?),
        SourceName::ExchangerateHost => Arc::new(ExchangerateHost::new(cfg, pool)?),
        SourceName::Finnhub => Arc::new(Finnhub::new(cfg, pool)?),
        SourceName::Frankfurter => Arc::new(Frankfurter::new(cfg, pool)?),
        SourceName::Kraken => Arc::new(Kraken::new(cfg, pool)?),
        SourceName::Okx => Arc::new(Okx::new(cfg, pool)?),
    })
}

/// Start the shared HTTP client builder for an adapter: base URL (config
/// override wins), timeout, proxy selection, and the pooled per-host
/// limiter. Adapters add their own auth params or headers before building.
pub(crate) fn http_builder(
    source: SourceName,
    cfg: &SourceConfig,
    pool: &LimiterPool,
    default_base: &str,
) -> Result<pricefeed_core::HttpClientBuilder, FeedError> {
    let base = cfg.api_url.clone().unwrap_or_else(|| default_base.to_owned());
    let host = url::Url::parse(&base)
        .ok()
        .and_then(|u| u.host_str().map(str::to_owned))
        .ok_or_else(|| FeedError::InvalidArg(format!("bad api url for {source}: {base}")))?;
    let limiter = pool.limiter(&host, cfg.rps, cfg.max_concurrent);

    let mut builder = HttpClient::builder(source)
        .base_url(base)
        .timeout(cfg.timeout())
        .limiter(limiter)
        .max_retries(cfg.max_retries);
    match &cfg.use_proxy {
        ProxySetting::Url(url) => builder = builder.proxy_url(url),
        ProxySetting::Env(true) => builder = builder.env_proxy(true),
        ProxySetting::Env(false) | ProxySetting::Off => {}
    }
    Ok(builder)
}

/// Parse a decimal price out of a JSON string or number, keeping the
/// upstream's textual representation intact for numbers.
pub(crate) fn decimal_from_value(
    source: SourceName,
    value: &serde_json::Value,
    context: &str,
) -> Result<rust_decimal::Decimal, FeedError> {
    let text = match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        other => {
            return Err(FeedError::malformed(
                source,
                format!("{context}: expected price, got {other}"),
            ));
        }
    };
    text.parse()
        .map_err(|e| FeedError::malformed(source, format!("{context}: bad decimal {text}: {e}")))
}
