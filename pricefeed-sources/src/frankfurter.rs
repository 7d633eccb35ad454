use async_trait::async_trait;

use pricefeed_core::{FeedError, HttpClient, LimiterPool, SourceAdapter};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

use crate::{decimal_from_value, http_builder};

const DEFAULT_BASE: &str = "https://api.frankfurter.app";
const SOURCE: SourceName = SourceName::Frankfurter;

/// Frankfurter FX adapter (fiat only, no key).
pub struct Frankfurter {
    http: HttpClient,
    enabled: bool,
}

impl Frankfurter {
    /// Build the adapter from config.
    ///
    /// # Errors
    /// Returns `InvalidArg` for unparsable URLs.
    pub fn new(cfg: &SourceConfig, pool: &LimiterPool) -> Result<Self, FeedError> {
        Ok(Self {
            http: http_builder(SOURCE, cfg, pool, DEFAULT_BASE)?.build()?,
            enabled: cfg.enabled,
        })
    }
}

#[async_trait]
impl SourceAdapter for Frankfurter {
    fn name(&self) -> SourceName {
        SOURCE
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        let from = pair.base().to_uppercase();
        let to = pair.quote().to_uppercase();
        let body = self
            .http
            .get_json("/latest", &[("from", from.as_str()), ("to", to.as_str())])
            .await
            .map_err(|e| match e {
                FeedError::UpstreamStatus {
                    status: 404 | 422, ..
                } => FeedError::price_not_found(format!("frankfurter {pair}")),
                other => other,
            })?;

        let rate = body
            .get("rates")
            .and_then(|r| r.get(&to))
            .ok_or_else(|| FeedError::price_not_found(format!("frankfurter {pair}")))?;
        let price = decimal_from_value(SOURCE, rate, "rate")?;
        Ok(PriceQuote::new(pair.clone(), SOURCE, price))
    }
}
