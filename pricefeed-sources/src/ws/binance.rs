use std::sync::atomic::{AtomicU64, Ordering};

use pricefeed_core::stream::{InboundQuote, WireProtocol};
use pricefeed_types::{Pair, SourceName};

static REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Binance trade-stream dialect.
#[derive(Default)]
pub struct BinanceWire;

impl WireProtocol for BinanceWire {
    fn source(&self) -> SourceName {
        SourceName::Binance
    }

    fn endpoint(&self) -> String {
        "wss://stream.binance.com:9443/ws".to_owned()
    }

    fn identifier(&self, pair: &Pair) -> String {
        format!("{}@trade", crate::binance::wire_symbol(pair).to_lowercase())
    }

    fn subscribe_frames(&self, idents: &[String]) -> Vec<String> {
        vec![
            serde_json::json!({
                "method": "SUBSCRIBE",
                "params": idents,
                "id": REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            })
            .to_string(),
        ]
    }

    fn unsubscribe_frames(&self, idents: &[String]) -> Vec<String> {
        vec![
            serde_json::json!({
                "method": "UNSUBSCRIBE",
                "params": idents,
                "id": REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            })
            .to_string(),
        ]
    }

    fn parse(&self, msg: &serde_json::Value) -> Option<InboundQuote> {
        if msg.get("e")?.as_str()? != "trade" {
            return None;
        }
        let symbol = msg.get("s")?.as_str()?;
        let price = msg.get("p")?.as_str()?.parse().ok()?;
        let received_at = msg.get("T")?.as_i64()?;
        Some(InboundQuote {
            identifier: format!("{}@trade", symbol.to_lowercase()),
            price,
            received_at,
        })
    }
}
