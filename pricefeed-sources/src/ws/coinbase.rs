use pricefeed_core::stream::{InboundQuote, WireProtocol};
use pricefeed_types::{Pair, SourceName, now_ms};

/// Coinbase Exchange ticker-channel dialect.
#[derive(Default)]
pub struct CoinbaseWire;

impl WireProtocol for CoinbaseWire {
    fn source(&self) -> SourceName {
        SourceName::Coinbase
    }

    fn endpoint(&self) -> String {
        "wss://ws-feed.exchange.coinbase.com".to_owned()
    }

    fn identifier(&self, pair: &Pair) -> String {
        format!(
            "{}-{}",
            pair.base().to_uppercase(),
            pair.quote().to_uppercase()
        )
    }

    fn subscribe_frames(&self, idents: &[String]) -> Vec<String> {
        vec![
            serde_json::json!({
                "type": "subscribe",
                "product_ids": idents,
                "channels": ["ticker"],
            })
            .to_string(),
        ]
    }

    fn unsubscribe_frames(&self, idents: &[String]) -> Vec<String> {
        vec![
            serde_json::json!({
                "type": "unsubscribe",
                "product_ids": idents,
                "channels": ["ticker"],
            })
            .to_string(),
        ]
    }

    fn parse(&self, msg: &serde_json::Value) -> Option<InboundQuote> {
        if msg.get("type")?.as_str()? != "ticker" {
            return None;
        }
        Some(InboundQuote {
            identifier: msg.get("product_id")?.as_str()?.to_owned(),
            price: msg.get("price")?.as_str()?.parse().ok()?,
            received_at: now_ms(),
        })
    }
}
