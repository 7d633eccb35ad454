use async_trait::async_trait;

use pricefeed_core::{FeedError, HttpClient, LimiterPool, SourceAdapter};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

use crate::{decimal_from_value, http_builder};

const DEFAULT_BASE: &str = "https://www.alphavantage.co";
const SOURCE: SourceName = SourceName::AlphaVantage;

/// Alpha Vantage realtime FX adapter. A key is mandatory; its absence
/// surfaces on the first request, not at startup.
pub struct AlphaVantage {
    http: HttpClient,
    enabled: bool,
    has_key: bool,
}

impl AlphaVantage {
    /// Build the adapter from config.
    ///
    /// # Errors
    /// Returns `InvalidArg` for unparsable URLs.
    pub fn new(cfg: &SourceConfig, pool: &LimiterPool) -> Result<Self, FeedError> {
        let mut builder = http_builder(SOURCE, cfg, pool, DEFAULT_BASE)?;
        if let Some(key) = &cfg.api_key {
            builder = builder.default_param("apikey", key);
        }
        Ok(Self {
            http: builder.build()?,
            enabled: cfg.enabled,
            has_key: cfg.api_key.is_some(),
        })
    }
}

#[async_trait]
impl SourceAdapter for AlphaVantage {
    fn name(&self) -> SourceName {
        SOURCE
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        if !self.has_key {
            return Err(FeedError::unauthorized(SOURCE, "no api key configured"));
        }
        let from = pair.base().to_uppercase();
        let to = pair.quote().to_uppercase();
        let body = self
            .http
            .get_json(
                "/query",
                &[
                    ("function", "CURRENCY_EXCHANGE_RATE"),
                    ("from_currency", from.as_str()),
                    ("to_currency", to.as_str()),
                ],
            )
            .await?;

        if let Some(msg) = body.get("Error Message").and_then(|m| m.as_str()) {
            return Err(FeedError::price_not_found(format!(
                "alphavantage {pair}: {msg}"
            )));
        }
        // A "Note" body is Alpha Vantage's throttle signal on a 200.
        if body.get("Note").is_some() {
            return Err(FeedError::UpstreamStatus {
                source: SOURCE,
                status: 429,
            });
        }

        let rate = body
            .get("Realtime Currency Exchange Rate")
            .and_then(|r| r.get("5. Exchange Rate"))
            .ok_or_else(|| {
                FeedError::malformed(SOURCE, "missing .\"Realtime Currency Exchange Rate\"")
            })?;
        let price = decimal_from_value(SOURCE, rate, "exchange rate")?;
        Ok(PriceQuote::new(pair.clone(), SOURCE, price))
    }
}
