use std::collections::HashMap;

use async_trait::async_trait;

use pricefeed_core::{BatchQuoteProvider, FeedError, HttpClient, LimiterPool, SourceAdapter};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

use crate::{decimal_from_value, http_builder};

const DEFAULT_BASE: &str = "https://api.coingecko.com";
const SOURCE: SourceName = SourceName::Coingecko;

/// CoinGecko keys prices by coin id, not ticker symbol.
const SYMBOL_TO_ID: &[(&str, &str)] = &[
    ("ADA", "cardano"),
    ("ATOM", "cosmos"),
    ("AVAX", "avalanche-2"),
    ("BNB", "binancecoin"),
    ("BTC", "bitcoin"),
    ("DOGE", "dogecoin"),
    ("DOT", "polkadot"),
    ("ETH", "ethereum"),
    ("LINK", "chainlink"),
    ("LTC", "litecoin"),
    ("MATIC", "matic-network"),
    ("SOL", "solana"),
    ("UNI", "uniswap"),
    ("XLM", "stellar"),
    ("XRP", "ripple"),
];

fn coin_id(symbol: &str) -> Option<&'static str> {
    let upper = symbol.to_uppercase();
    SYMBOL_TO_ID
        .iter()
        .find(|(sym, _)| *sym == upper)
        .map(|(_, id)| *id)
}

/// CoinGecko simple-price adapter.
pub struct Coingecko {
    http: HttpClient,
    enabled: bool,
    max_batch: Option<usize>,
}

impl Coingecko {
    /// Build the adapter from config.
    ///
    /// # Errors
    /// Returns `InvalidArg` for unparsable URLs.
    pub fn new(cfg: &SourceConfig, pool: &LimiterPool) -> Result<Self, FeedError> {
        let mut builder = http_builder(SOURCE, cfg, pool, DEFAULT_BASE)?;
        // The pro tier authenticates with a query param.
        if let Some(key) = &cfg.api_key {
            builder = builder.default_param("x_cg_pro_api_key", key);
        }
        Ok(Self {
            http: builder.build()?,
            enabled: cfg.enabled,
            max_batch: cfg.max_batch_size,
        })
    }

    fn extract(
        &self,
        pair: &Pair,
        id: &str,
        body: &serde_json::Value,
    ) -> Result<PriceQuote, FeedError> {
        let value = body
            .get(id)
            .and_then(|row| row.get(pair.quote().to_lowercase()))
            .ok_or_else(|| FeedError::price_not_found(format!("coingecko {pair}")))?;
        let price = decimal_from_value(SOURCE, value, "simple price")?;
        Ok(PriceQuote::new(pair.clone(), SOURCE, price))
    }
}

#[async_trait]
impl SourceAdapter for Coingecko {
    fn name(&self) -> SourceName {
        SOURCE
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        let Some(id) = coin_id(pair.base()) else {
            return Err(FeedError::price_not_found(format!(
                "coingecko has no id for {}",
                pair.base()
            )));
        };
        let vs = pair.quote().to_lowercase();
        let body = self
            .http
            .get_json(
                "/api/v3/simple/price",
                &[("ids", id), ("vs_currencies", vs.as_str())],
            )
            .await?;
        self.extract(pair, id, &body)
    }

    fn as_batch_provider(&self) -> Option<&dyn BatchQuoteProvider> {
        Some(self)
    }
}

#[async_trait]
impl BatchQuoteProvider for Coingecko {
    async fn fetch_quotes(&self, pairs: &[Pair]) -> Vec<Result<PriceQuote, FeedError>> {
        let mut out: Vec<Option<Result<PriceQuote, FeedError>>> = vec![None; pairs.len()];

        // Resolve ids up front; unknown symbols miss without an upstream call.
        let mut resolvable: Vec<(usize, &'static str)> = Vec::new();
        for (i, pair) in pairs.iter().enumerate() {
            match coin_id(pair.base()) {
                Some(id) => resolvable.push((i, id)),
                None => {
                    out[i] = Some(Err(FeedError::price_not_found(format!(
                        "coingecko has no id for {}",
                        pair.base()
                    ))));
                }
            }
        }

        let chunk_len = self.max_batch.unwrap_or(resolvable.len()).max(1);
        for chunk in resolvable.chunks(chunk_len) {
            let mut ids: Vec<&str> = chunk.iter().map(|(_, id)| *id).collect();
            ids.sort_unstable();
            ids.dedup();
            let mut currencies: Vec<String> = chunk
                .iter()
                .map(|(i, _)| pairs[*i].quote().to_lowercase())
                .collect();
            currencies.sort();
            currencies.dedup();

            let ids_param = ids.join(",");
            let vs_param = currencies.join(",");
            match self
                .http
                .get_json(
                    "/api/v3/simple/price",
                    &[("ids", ids_param.as_str()), ("vs_currencies", vs_param.as_str())],
                )
                .await
            {
                Ok(body) => {
                    for (i, id) in chunk {
                        out[*i] = Some(self.extract(&pairs[*i], id, &body));
                    }
                }
                Err(err) => {
                    for (i, _) in chunk {
                        out[*i] = Some(Err(err.clone()));
                    }
                }
            }
        }

        out.into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(FeedError::price_not_found("coingecko"))))
            .collect()
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch
    }
}
