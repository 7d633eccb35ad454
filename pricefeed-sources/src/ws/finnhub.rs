use pricefeed_core::stream::{InboundQuote, WireProtocol};
use pricefeed_types::{Pair, SourceName, now_ms};

/// Finnhub trade-stream dialect. Subscriptions are one frame per symbol.
pub struct FinnhubWire {
    token: String,
}

impl FinnhubWire {
    /// Build the dialect; the token rides on the endpoint URL.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self { token }
    }
}

impl WireProtocol for FinnhubWire {
    fn source(&self) -> SourceName {
        SourceName::Finnhub
    }

    fn endpoint(&self) -> String {
        format!("wss://ws.finnhub.io?token={}", self.token)
    }

    fn identifier(&self, pair: &Pair) -> String {
        crate::finnhub::oanda_symbol(pair)
    }

    fn subscribe_frames(&self, idents: &[String]) -> Vec<String> {
        idents
            .iter()
            .map(|id| serde_json::json!({"type": "subscribe", "symbol": id}).to_string())
            .collect()
    }

    fn unsubscribe_frames(&self, idents: &[String]) -> Vec<String> {
        idents
            .iter()
            .map(|id| serde_json::json!({"type": "unsubscribe", "symbol": id}).to_string())
            .collect()
    }

    fn parse(&self, msg: &serde_json::Value) -> Option<InboundQuote> {
        if msg.get("type")?.as_str()? != "trade" {
            return None;
        }
        let row = msg.get("data")?.as_array()?.last()?;
        let identifier = row.get("s")?.as_str()?.to_owned();
        let price = match row.get("p")? {
            serde_json::Value::Number(n) => n.to_string().parse().ok()?,
            serde_json::Value::String(s) => s.parse().ok()?,
            _ => return None,
        };
        let received_at = row.get("t").and_then(|t| t.as_i64()).unwrap_or_else(now_ms);
        Some(InboundQuote {
            identifier,
            price,
            received_at,
        })
    }
}
