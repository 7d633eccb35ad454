use std::collections::HashMap;

use async_trait::async_trait;

use pricefeed_core::stream::StreamAdapter;
use pricefeed_core::{
    BatchQuoteProvider, FeedError, HttpClient, LimiterPool, SourceAdapter, StreamQuoteProvider,
};
use pricefeed_types::{Pair, PriceQuote, SourceConfig, SourceName};

use crate::ws::CryptocompareWire;
use crate::{decimal_from_value, http_builder};

const DEFAULT_BASE: &str = "https://min-api.cryptocompare.com";
const SOURCE: SourceName = SourceName::Cryptocompare;

/// CryptoCompare price adapter (`Apikey` auth header when configured).
pub struct Cryptocompare {
    http: HttpClient,
    enabled: bool,
    max_batch: Option<usize>,
    stream: StreamAdapter<CryptocompareWire>,
}

impl Cryptocompare {
    /// Build the adapter from config.
    ///
    /// # Errors
    /// Returns `InvalidArg` for unparsable URLs or header values.
    pub fn new(cfg: &SourceConfig, pool: &LimiterPool) -> Result<Self, FeedError> {
        let mut builder = http_builder(SOURCE, cfg, pool, DEFAULT_BASE)?;
        if let Some(key) = &cfg.api_key {
            builder = builder.header("authorization", format!("Apikey {key}"));
        }
        Ok(Self {
            http: builder.build()?,
            enabled: cfg.enabled,
            max_batch: cfg.max_batch_size,
            stream: StreamAdapter::new(
                CryptocompareWire::new(cfg.api_key.clone()),
                cfg.stream.clone().unwrap_or_default(),
            ),
        })
    }

    fn vendor_error(pair: &Pair, body: &serde_json::Value) -> Option<FeedError> {
        let response = body.get("Response").and_then(|r| r.as_str())?;
        if !response.eq_ignore_ascii_case("error") {
            return None;
        }
        let msg = body
            .get("Message")
            .and_then(|m| m.as_str())
            .unwrap_or("unknown error");
        if msg.contains("market does not exist") {
            Some(FeedError::price_not_found(format!("cryptocompare {pair}")))
        } else if msg.to_lowercase().contains("api key") {
            Some(FeedError::unauthorized(SOURCE, msg))
        } else {
            Some(FeedError::api(SOURCE, msg))
        }
    }
}

#[async_trait]
impl SourceAdapter for Cryptocompare {
    fn name(&self) -> SourceName {
        SOURCE
    }

    fn enabled(&self) -> bool {
        self.enabled
    }

    async fn fetch_quote(&self, pair: &Pair) -> Result<PriceQuote, FeedError> {
        let fsym = pair.base().to_uppercase();
        let tsym = pair.quote().to_uppercase();
        let body = self
            .http
            .get_json(
                "/data/price",
                &[("fsym", fsym.as_str()), ("tsyms", tsym.as_str())],
            )
            .await?;

        if let Some(err) = Self::vendor_error(pair, &body) {
            return Err(err);
        }
        let value = body
            .get(&tsym)
            .ok_or_else(|| FeedError::price_not_found(format!("cryptocompare {pair}")))?;
        let price = decimal_from_value(SOURCE, value, "price")?;
        Ok(PriceQuote::new(pair.clone(), SOURCE, price))
    }

    fn as_batch_provider(&self) -> Option<&dyn BatchQuoteProvider> {
        Some(self)
    }

    fn as_stream_provider(&self) -> Option<&dyn StreamQuoteProvider> {
        Some(&self.stream)
    }
}

#[async_trait]
impl BatchQuoteProvider for Cryptocompare {
    async fn fetch_quotes(&self, pairs: &[Pair]) -> Vec<Result<PriceQuote, FeedError>> {
        let mut out: Vec<Option<Result<PriceQuote, FeedError>>> = vec![None; pairs.len()];
        let chunk_len = self.max_batch.unwrap_or(pairs.len()).max(1);

        for chunk_indices in (0..pairs.len()).collect::<Vec<_>>().chunks(chunk_len) {
            let mut fsyms: Vec<String> = Vec::new();
            let mut tsyms: Vec<String> = Vec::new();
            for &i in chunk_indices {
                let f = pairs[i].base().to_uppercase();
                let t = pairs[i].quote().to_uppercase();
                if !fsyms.contains(&f) {
                    fsyms.push(f);
                }
                if !tsyms.contains(&t) {
                    tsyms.push(t);
                }
            }
            let fsyms_param = fsyms.join(",");
            let tsyms_param = tsyms.join(",");

            match self
                .http
                .get_json(
                    "/data/pricemulti",
                    &[
                        ("fsyms", fsyms_param.as_str()),
                        ("tsyms", tsyms_param.as_str()),
                    ],
                )
                .await
            {
                Ok(body) => {
                    let vendor_err = chunk_indices
                        .first()
                        .and_then(|&i| Self::vendor_error(&pairs[i], &body));
                    for &i in chunk_indices {
                        let pair = &pairs[i];
                        out[i] = Some(if let Some(err) = &vendor_err {
                            Err(err.clone())
                        } else {
                            let rates: HashMap<String, serde_json::Value> = body
                                .get(pair.base().to_uppercase())
                                .and_then(|row| row.as_object())
                                .map(|row| {
                                    row.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
                                })
                                .unwrap_or_default();
                            match rates.get(&pair.quote().to_uppercase()) {
                                Some(value) => decimal_from_value(SOURCE, value, "pricemulti")
                                    .map(|price| PriceQuote::new(pair.clone(), SOURCE, price)),
                                None => Err(FeedError::price_not_found(format!(
                                    "cryptocompare {pair}"
                                ))),
                            }
                        });
                    }
                }
                Err(err) => {
                    for &i in chunk_indices {
                        out[i] = Some(Err(err.clone()));
                    }
                }
            }
        }

        out.into_iter()
            .map(|slot| slot.unwrap_or_else(|| Err(FeedError::price_not_found("cryptocompare"))))
            .collect()
    }

    fn max_batch_size(&self) -> Option<usize> {
        self.max_batch
    }
}
