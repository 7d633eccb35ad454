use async_trait::async_trait;

use pricefeed_core::{FeedError, HttpClient, LimiterPool, SourceAdapter};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

use crate::{decimal_from_value, http_builder};

const DEFAULT_BASE: &str = "https://api.exchangerate.host";
const SOURCE: SourceName = SourceName::ExchangerateHost;

/// exchangerate.host FX adapter. The access key is optional.
pub struct ExchangerateHost {
    http: HttpClient,
    enabled: bool,
}

impl ExchangerateHost {
    /// Build the adapter from config.
    ///
    /// # Errors
    /// Returns `InvalidArg` for unparsable URLs.
    pub fn new(cfg: &SourceConfig, pool: &LimiterPool) -> Result<Self, FeedError> {
        let mut builder = http_builder(SOURCE, cfg, pool, DEFAULT_BASE)?;
        if let Some(key) = &cfg.api_key {
            builder = builder.default_param("access_key", key);
        }
        Ok(Self {
            http: builder.build()?,
            enabled: cfg.enabled,
        })
    }
}

#[async_trait]
impl SourceAdapter for ExchangerateHost {
    fn name(&self) -> SourceName {
        SOURCE
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        let base = pair.base().to_uppercase();
        let symbol = pair.quote().to_uppercase();
        let body = self
            .http
            .get_json(
                "/latest",
                &[("base", base.as_str()), ("symbols", symbol.as_str())],
            )
            .await?;

        if body.get("success").and_then(serde_json::Value::as_bool) == Some(false) {
            let code = body
                .get("error")
                .and_then(|e| e.get("code"))
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0);
            let info = body
                .get("error")
                .and_then(|e| e.get("info"))
                .and_then(|i| i.as_str())
                .unwrap_or("unknown error");
            // 101: missing or invalid access key.
            if code == 101 {
                return Err(FeedError::unauthorized(SOURCE, info));
            }
            return Err(FeedError::api(SOURCE, format!("code {code}: {info}")));
        }

        let rate = body
            .get("rates")
            .and_then(|r| r.get(&symbol))
            .ok_or_else(|| FeedError::price_not_found(format!("exchangerate-host {pair}")))?;
        let price = decimal_from_value(SOURCE, rate, "rate")?;
        Ok(PriceQuote::new(pair.clone(), SOURCE, price))
    }
}
