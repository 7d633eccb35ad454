use async_trait::async_trait;

use pricefeed_core::stream::StreamAdapter;
use pricefeed_core::{FeedError, HttpClient, LimiterPool, SourceAdapter, StreamQuoteProvider};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

use crate::ws::FinnhubWire;
use crate::{decimal_from_value, http_builder};

const DEFAULT_BASE: &str = "https://finnhub.io";
const SOURCE: SourceName = SourceName::Finnhub;

/// Finnhub quotes FX pairs under OANDA's naming.
pub(crate) fn oanda_symbol(pair: &Pair) -> String {
    format!(
        "OANDA:{}_{}",
        pair.base().to_uppercase(),
        pair.quote().to_uppercase()
    )
}

/// Finnhub quote adapter. A token is mandatory; its absence surfaces on
/// the first request, not at startup.
pub struct Finnhub {
    http: HttpClient,
    enabled: bool,
    has_key: bool,
    stream: StreamAdapter<FinnhubWire>,
}

impl Finnhub {
    /// Build the adapter from config.
    ///
    /// # Errors
    /// Returns `InvalidArg` for unparsable URLs.
    pub fn new(cfg: &SourceConfig, pool: &LimiterPool) -> Result<Self, FeedError> {
        let mut builder = http_builder(SOURCE, cfg, pool, DEFAULT_BASE)?;
        if let Some(key) = &cfg.api_key {
            builder = builder.default_param("token", key);
        }
        Ok(Self {
            http: builder.build()?,
            enabled: cfg.enabled,
            has_key: cfg.api_key.is_some(),
            stream: StreamAdapter::new(
                FinnhubWire::new(cfg.api_key.clone().unwrap_or_default()),
                cfg.stream.clone().unwrap_or_default(),
            ),
        })
    }
}

#[async_trait]
impl SourceAdapter for Finnhub {
    fn name(&self) -> SourceName {
        SOURCE
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        if !self.has_key {
            return Err(FeedError::unauthorized(SOURCE, "no token configured"));
        }
        let symbol = oanda_symbol(pair);
        let body = self
            .http
            .get_json("/api/v1/quote", &[("symbol", symbol.as_str())])
            .await?;

        let current = body
            .get("c")
            .ok_or_else(|| FeedError::malformed(SOURCE, "missing .c"))?;
        // Finnhub answers unknown symbols with a zeroed quote.
        if current.as_f64() == Some(0.0) || current.is_null() {
            return Err(FeedError::price_not_found(format!("finnhub {pair}")));
        }
        let price = decimal_from_value(SOURCE, current, "current price")?;
        Ok(PriceQuote::new(pair.clone(), SOURCE, price))
    }

    fn as_stream_provider(&self) -> Option<&dyn StreamQuoteProvider> {
        Some(&self.stream)
    }
}
