use std::collections::HashMap;

use async_trait::async_trait;

use pricefeed_core::stream::StreamAdapter;
use pricefeed_core::{
    BatchQuoteProvider, FeedError, HttpClient, LimiterPool, SourceAdapter, StreamQuoteProvider,
};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

use crate::ws::BinanceWire;
use crate::{decimal_from_value, http_builder};

const DEFAULT_BASE: &str = "https://api.binance.com";
const SOURCE: SourceName = SourceName::Binance;

/// Binance rewrites `USD` to its `USDT` book; the caller never sees the
/// rewritten symbol.
pub(crate) fn wire_symbol(pair: &Pair) -> String {
    let map = |s: &str| {
        if s.eq_ignore_ascii_case("USD") {
            "USDT".to_owned()
        } else {
            s.to_uppercase()
        }
    };
    format!("{}{}", map(pair.base()), map(pair.quote()))
}

/// Binance spot ticker adapter.
pub struct Binance {
    http: HttpClient,
    enabled: bool,
    max_batch: Option<usize>,
    stream: StreamAdapter<BinanceWire>,
}

impl Binance {
    /// Build the adapter from config.
    ///
    /// # Errors
    /// Returns `InvalidArg` for unparsable URLs.
    pub fn new(cfg: &SourceConfig, pool: &LimiterPool) -> Result<Self, FeedError> {
        Ok(Self {
            http: http_builder(SOURCE, cfg, pool, DEFAULT_BASE)?.build()?,
            enabled: cfg.enabled,
            max_batch: cfg.max_batch_size,
            stream: StreamAdapter::new(
                BinanceWire::default(),
                cfg.stream.clone().unwrap_or_default(),
            ),
        })
    }

    fn quote_from_body(
        &self,
        pair: &Pair,
        body: &serde_json::Value,
    ) -> Result<PriceQuote, FeedError> {
        let price = body
            .get("price")
            .ok_or_else(|| FeedError::malformed(SOURCE, "missing .price"))
            .and_then(|v| decimal_from_value(SOURCE, v, "ticker price"))?;
        Ok(PriceQuote::new(pair.clone(), SOURCE, price))
    }

    fn map_status_error(pair: &Pair, err: FeedError) -> FeedError {
        // Binance signals an unknown symbol with 400 (code -1121).
        match err {
            FeedError::UpstreamStatus {
                status: 400 | 404, ..
            } => FeedError::price_not_found(format!("binance {pair}")),
            other => other,
        }
    }
}

#[async_trait]
impl SourceAdapter for Binance {
    fn name(&self) -> SourceName {
        SOURCE
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        let symbol = wire_symbol(pair);
        let body = self
            .http
            .get_json("/api/v3/ticker/price", &[("symbol", symbol.as_str())])
            .await
            .map_err(|e| Self::map_status_error(pair, e))?;
        self.quote_from_body(pair, &body)
    }

    fn as_batch_provider(&self) -> Option<&dyn BatchQuoteProvider> {
        Some(self)
    }

    fn as_stream_provider(&self) -> Option<&dyn StreamQuoteProvider> {
        Some(&self.stream)
    }
}

#[async_trait]
impl BatchQuoteProvider for Binance {
    async fn fetch_quotes(&self, pairs: &[Pair]) -> Vec<Result<PriceQuote, FeedError>> {
        let mut out: Vec<Option<Result<PriceQuote, FeedError>>> = vec![None; pairs.len()];
        let chunk_len = self.max_batch.unwrap_or(pairs.len()).max(1);

        for chunk_indices in (0..pairs.len()).collect::<Vec<_>>().chunks(chunk_len) {
            // One wire symbol can serve several requested pairs (BTC/USD and
            // BTC/USDT both land on BTCUSDT).
            let mut by_symbol: HashMap<String, Vec<usize>> = HashMap::new();
            for &i in chunk_indices {
                by_symbol.entry(wire_symbol(&pairs[i])).or_default().push(i);
            }
            let mut symbols: Vec<&str> = by_symbol.keys().map(String::as_str).collect();
            symbols.sort_unstable();
            let symbols_param = serde_json::to_string(&symbols).unwrap_or_default();

            match self
                .http
                .get_json("/api/v3/ticker/price", &[("symbols", symbols_param.as_str())])
                .await
            {
                Ok(body) => {
                    let rows = body.as_array().cloned().unwrap_or_default();
                    let mut prices: HashMap<String, serde_json::Value> = HashMap::new();
                    for row in rows {
                        if let Some(symbol) = row.get("symbol").and_then(|s| s.as_str()) {
                            prices.insert(symbol.to_owned(), row.clone());
                        }
                    }
                    for (symbol, indices) in &by_symbol {
                        for &i in indices {
                            out[i] = Some(match prices.get(symbol) {
                                Some(row) => self.quote_from_body(&pairs[i], row),
                                None => Err(FeedError::price_not_found(format!(
                                    "binance {}",
                                    pairs[i]
                                ))),
                            });
                        }
                    }
                }
                Err(err) => {
                    for &i in chunk_indices {
                        out[i] = Some(Err(Self::map_status_error(&pairs[i], err.clone())));
                    }
                }
            }
        }

        out.into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(FeedError::price_not_found("binance"))))
            .collect()
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch
    }
}
