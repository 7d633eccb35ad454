use pricefeed_core::stream::{InboundQuote, WireProtocol};
use pricefeed_types::{Pair, SourceName, now_ms};

/// CryptoCompare streamer dialect. Subscriptions use tilde-joined keys on
/// the aggregate index, e.g. `5~CCCAGG~BTC~USD`.
pub struct CryptocompareWire {
    api_key: Option<String>,
}

impl CryptocompareWire {
    /// Build the dialect; the key rides on the endpoint URL.
    #[must_use]
    pub const fn new(api_key: Option<String>) -> Self {
        Self { api_key }
    }
}

impl WireProtocol for CryptocompareWire {
    fn source(&self) -> SourceName {
        SourceName::Cryptocompare
    }

    fn endpoint(&self) -> String {
        match &self.api_key {
            Some(key) => format!("wss://streamer.cryptocompare.com/v2?api_key={key}"),
            None => "wss://streamer.cryptocompare.com/v2".to_owned(),
        }
    }

    fn identifier(&self, pair: &Pair) -> String {
        format!(
            "5~CCCAGG~{}~{}",
            pair.base().to_uppercase(),
            pair.quote().to_uppercase()
        )
    }

    fn subscribe_frames(&self, idents: &[String]) -> Vec<String> {
        vec![serde_json::json!({"action": "SubAdd", "subs": idents}).to_string()]
    }

    fn unsubscribe_frames(&self, idents: &[String]) -> Vec<String> {
        vec![serde_json::json!({"action": "SubRemove", "subs": idents}).to_string()]
    }

    fn parse(&self, msg: &serde_json::Value) -> Option<InboundQuote> {
        if msg.get("TYPE")?.as_str()? != "5" {
            return None;
        }
        let from = msg.get("FROMSYMBOL")?.as_str()?;
        let to = msg.get("TOSYMBOL")?.as_str()?;
        // Aggregate ticks without a PRICE field carry volume only.
        let price = msg.get("PRICE")?;
        let price = match price {
            serde_json::Value::Number(n) => n.to_string().parse().ok()?,
            serde_json::Value::String(s) => s.parse().ok()?,
            _ => return None,
        };
        Some(InboundQuote {
            identifier: format!("5~CCCAGG~{from}~{to}"),
            price,
            received_at: now_ms(),
        })
    }
}
