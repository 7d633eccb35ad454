use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::pair::Pair;
use crate::source::SourceName;

/// Current wall-clock instant as milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// A single price reading with provenance.
///
/// `price` is a decimal, serialized as a string so provider precision
/// survives the wire unchanged (never a float). `received_at` is the instant
/// the upstream observed or emitted the value; `cached_at` is set by the
/// cache when it accepts the quote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceQuote {
    /// The pair this quote prices, with the requester's original symbols.
    pub pair: Pair,
    /// The provider that produced the reading.
    pub source: SourceName,
    /// The price, lossless.
    #[serde(with = "rust_decimal::serde::str")]
    pub price: Decimal,
    /// Upstream observation instant, epoch milliseconds.
    pub received_at: i64,
    /// Cache acceptance instant, epoch milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<i64>,
}

impl PriceQuote {
    /// Build a quote observed now.
    #[must_use]
    pub fn new(pair: Pair, source: SourceName, price: Decimal) -> Self {
        Self {
            pair,
            source,
            price,
            received_at: now_ms(),
            cached_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_serializes_as_string() {
        let q = PriceQuote {
            pair: Pair::new("BTC", "USD").unwrap(),
            source: SourceName::Binance,
            price: "67890.12".parse().unwrap(),
            received_at: 1_700_000_000_000,
            cached_at: None,
        };
        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["price"], serde_json::json!("67890.12"));
        assert_eq!(json["pair"], serde_json::json!(["BTC", "USD"]));
        assert_eq!(json["receivedAt"], serde_json::json!(1_700_000_000_000_i64));
        assert!(json.get("cachedAt").is_none());
    }
}
