use async_trait::async_trait;

use pricefeed_core::stream::StreamAdapter;
use pricefeed_core::{FeedError, HttpClient, LimiterPool, SourceAdapter, StreamQuoteProvider};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

use crate::ws::OkxWire;
use crate::{decimal_from_value, http_builder};

const DEFAULT_BASE: &str = "https://www.okx.com";
const SOURCE: SourceName = SourceName::Okx;

/// OKX instrument id: dash-joined, with `USD` rewritten to `USDT`.
pub(crate) fn inst_id(pair: &Pair) -> String {
    let map = |s: &str| {
        if s.eq_ignore_ascii_case("USD") {
            "USDT".to_owned()
        } else {
            s.to_uppercase()
        }
    };
    format!("{}-{}", map(pair.base()), map(pair.quote()))
}

/// OKX market ticker adapter.
pub struct Okx {
    http: HttpClient,
    enabled: bool,
    stream: StreamAdapter<OkxWire>,
}

impl Okx {
    /// Build the adapter from config.
    ///
    /// # Errors
    /// Returns `InvalidArg` for unparsable URLs.
    pub fn new(cfg: &SourceConfig, pool: &LimiterPool) -> Result<Self, FeedError> {
        Ok(Self {
            http: http_builder(SOURCE, cfg, pool, DEFAULT_BASE)?.build()?,
            enabled: cfg.enabled,
            stream: StreamAdapter::new(OkxWire::default(), cfg.stream.clone().unwrap_or_default()),
        })
    }
}

#[async_trait]
impl SourceAdapter for Okx {
    fn name(&self) -> SourceName {
        SOURCE
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        let inst = inst_id(pair);
        let body = self
            .http
            .get_json("/api/v5/market/ticker", &[("instId", inst.as_str())])
            .await?;

        let code = body.get("code").and_then(|c| c.as_str()).unwrap_or("");
        if code != "0" {
            let msg = body
                .get("msg")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown error");
            // 51001: instrument does not exist.
            if code == "51001" || msg.to_lowercase().contains("doesn't exist") {
                return Err(FeedError::price_not_found(format!("okx {pair}")));
            }
            return Err(FeedError::api(SOURCE, format!("code {code}: {msg}")));
        }

        let last = body
            .get("data")
            .and_then(|d| d.get(0))
            .and_then(|row| row.get("last"))
            .ok_or_else(|| FeedError::malformed(SOURCE, "missing .data[0].last"))?;
        let price = decimal_from_value(SOURCE, last, "ticker last")?;
        Ok(PriceQuote::new(pair.clone(), SOURCE, price))
    }

    fn as_stream_provider(&self) -> Option<&dyn StreamQuoteProvider> {
        Some(&self.stream)
    }
}
