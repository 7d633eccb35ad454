use pricefeed_core::stream::{InboundQuote, WireProtocol};
use pricefeed_types::{Pair, SourceName, now_ms};

/// Kraken v1 ticker dialect. Data frames are positional arrays:
/// `[channelId, payload, "ticker", "XBT/USD"]`.
#[derive(Default)]
pub struct KrakenWire;

impl WireProtocol for KrakenWire {
    fn source(&self) -> SourceName {
        SourceName::Kraken
    }

    fn endpoint(&self) -> String {
        "wss://ws.kraken.com".to_owned()
    }

    fn identifier(&self, pair: &Pair) -> String {
        format!(
            "{}/{}",
            crate::kraken::wire_asset(pair.base()),
            crate::kraken::wire_asset(pair.quote())
        )
    }

    fn subscribe_frames(&self, idents: &[String]) -> Vec<String> {
        vec![
            serde_json::json!({
                "event": "subscribe",
                "pair": idents,
                "subscription": {"name": "ticker"},
            })
            .to_string(),
        ]
    }

    fn unsubscribe_frames(&self, idents: &[String]) -> Vec<String> {
        vec![
            serde_json::json!({
                "event": "unsubscribe",
                "pair": idents,
                "subscription": {"name": "ticker"},
            })
            .to_string(),
        ]
    }

    fn parse(&self, msg: &serde_json::Value) -> Option<InboundQuote> {
        let frame = msg.as_array()?;
        if frame.len() < 4 || frame.get(2)?.as_str()? != "ticker" {
            return None;
        }
        let identifier = frame.last()?.as_str()?.to_owned();
        let close = frame.get(1)?.get("c")?.get(0)?.as_str()?;
        Some(InboundQuote {
            identifier,
            price: close.parse().ok()?,
            received_at: now_ms(),
        })
    }
}
