use async_trait::async_trait;

use pricefeed_core::stream::StreamAdapter;
use pricefeed_core::{FeedError, HttpClient, LimiterPool, SourceAdapter, StreamQuoteProvider};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

use crate::ws::KrakenWire;
use crate::{decimal_from_value, http_builder};

const DEFAULT_BASE: &str = "https://api.kraken.com";
const SOURCE: SourceName = SourceName::Kraken;

/// Kraken's legacy asset alias: `BTC` trades as `XBT`.
pub(crate) fn wire_asset(symbol: &str) -> String {
    if symbol.eq_ignore_ascii_case("BTC") {
        "XBT".to_owned()
    } else {
        symbol.to_uppercase()
    }
}

fn wire_pair(pair: &Pair) -> String {
    format!("{}{}", wire_asset(pair.base()), wire_asset(pair.quote()))
}

/// Kraken public ticker adapter.
pub struct Kraken {
    http: HttpClient,
    enabled: bool,
    stream: StreamAdapter<KrakenWire>,
}

impl Kraken {
    /// Build the adapter from config.
    ///
    /// # Errors
    /// Returns `InvalidArg` for unparsable URLs.
    pub fn new(cfg: &SourceConfig, pool: &LimiterPool) -> Result<Self, FeedError> {
        Ok(Self {
            http: http_builder(SOURCE, cfg, pool, DEFAULT_BASE)?.build()?,
            enabled: cfg.enabled,
            stream: StreamAdapter::new(
                KrakenWire::default(),
                cfg.stream.clone().unwrap_or_default(),
            ),
        })
    }
}

#[async_trait]
impl SourceAdapter for Kraken {
    fn name(&self) -> SourceName {
        SOURCE
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        let wire = wire_pair(pair);
        let body = self
            .http
            .get_json("/0/public/Ticker", &[("pair", wire.as_str())])
            .await?;

        let errors = body
            .get("error")
            .and_then(|e| e.as_array())
            .cloned()
            .unwrap_or_default();
        if !errors.is_empty() {
            let joined = errors
                .iter()
                .filter_map(|e| e.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            if joined.contains("Unknown asset pair") {
                return Err(FeedError::price_not_found(format!("kraken {pair}")));
            }
            return Err(FeedError::api(SOURCE, joined));
        }

        // The result key is Kraken's canonical name (e.g. XXBTZUSD for
        // XBTUSD), so take the single entry instead of indexing by request.
        let result = body
            .get("result")
            .and_then(|r| r.as_object())
            .ok_or_else(|| FeedError::malformed(SOURCE, "missing .result"))?;
        let (_, ticker) = result
            .iter()
            .next()
            .ok_or_else(|| FeedError::price_not_found(format!("kraken {pair}")))?;
        let close = ticker
            .get("c")
            .and_then(|c| c.get(0))
            .ok_or_else(|| FeedError::malformed(SOURCE, "missing .result.*.c[0]"))?;
        let price = decimal_from_value(SOURCE, close, "ticker close")?;
        Ok(PriceQuote::new(pair.clone(), SOURCE, price))
    }

    fn as_stream_provider(&self) -> Option<&dyn StreamQuoteProvider> {
        Some(&self.stream)
    }
}
