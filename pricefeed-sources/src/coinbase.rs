use async_trait::async_trait;

use pricefeed_core::stream::StreamAdapter;
use pricefeed_core::{FeedError, HttpClient, LimiterPool, SourceAdapter, StreamQuoteProvider};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

use crate::ws::CoinbaseWire;
use crate::{decimal_from_value, http_builder};

const DEFAULT_BASE: &str = "https://api.coinbase.com";
const SOURCE: SourceName = SourceName::Coinbase;

fn product_id(pair: &Pair) -> String {
    format!(
        "{}-{}",
        pair.base().to_uppercase(),
        pair.quote().to_uppercase()
    )
}

/// Coinbase spot price adapter.
pub struct Coinbase {
    http: HttpClient,
    enabled: bool,
    stream: StreamAdapter<CoinbaseWire>,
}

impl Coinbase {
    /// Build the adapter from config.
    ///
    /// # Errors
    /// Returns `InvalidArg` for unparsable URLs.
    pub fn new(cfg: &SourceConfig, pool: &LimiterPool) -> Result<Self, FeedError> {
        Ok(Self {
            http: http_builder(SOURCE, cfg, pool, DEFAULT_BASE)?.build()?,
            enabled: cfg.enabled,
            stream: StreamAdapter::new(
                CoinbaseWire::default(),
                cfg.stream.clone().unwrap_or_default(),
            ),
        })
    }
}

#[async_trait]
impl SourceAdapter for Coinbase {
    fn name(&self) -> SourceName {
        SOURCE
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        let path = format!("/v2/prices/{}/spot", product_id(pair));
        let body = self.http.get_json(&path, &[]).await.map_err(|e| match e {
            FeedError::UpstreamStatus { status: 404, .. } => {
                FeedError::price_not_found(format!("coinbase {pair}"))
            }
            other => other,
        })?;

        let amount = body
            .get("data")
            .and_then(|d| d.get("amount"))
            .ok_or_else(|| FeedError::malformed(SOURCE, "missing .data.amount"))?;
        let price = decimal_from_value(SOURCE, amount, "spot amount")?;
        Ok(PriceQuote::new(pair.clone(), SOURCE, price))
    }

    fn as_stream_provider(&self) -> Option<&dyn StreamQuoteProvider> {
        Some(&self.stream)
    }
}
