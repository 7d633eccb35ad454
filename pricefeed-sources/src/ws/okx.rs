use pricefeed_core::stream::{InboundQuote, WireProtocol};
use pricefeed_types::{Pair, SourceName, now_ms};

/// OKX public tickers dialect. The endpoint expects a text `ping` and
/// answers with a text `pong`.
#[derive(Default)]
pub struct OkxWire;

impl WireProtocol for OkxWire {
    fn source(&self) -> SourceName {
        SourceName::Okx
    }

    fn endpoint(&self) -> String {
        "wss://ws.okx.com:8443/ws/v5/public".to_owned()
    }

    fn identifier(&self, pair: &Pair) -> String {
        crate::okx::inst_id(pair)
    }

    fn subscribe_frames(&self, idents: &[String]) -> Vec<String> {
        let args: Vec<_> = idents
            .iter()
            .map(|id| serde_json::json!({"channel": "tickers", "instId": id}))
            .collect();
        vec![serde_json::json!({"op": "subscribe", "args": args}).to_string()]
    }

    fn unsubscribe_frames(&self, idents: &[String]) -> Vec<String> {
        let args: Vec<_> = idents
            .iter()
            .map(|id| serde_json::json!({"channel": "tickers", "instId": id}))
            .collect();
        vec![serde_json::json!({"op": "unsubscribe", "args": args}).to_string()]
    }

    fn parse(&self, msg: &serde_json::Value) -> Option<InboundQuote> {
        let arg = msg.get("arg")?;
        if arg.get("channel")?.as_str()? != "tickers" {
            return None;
        }
        let identifier = arg.get("instId")?.as_str()?.to_owned();
        let row = msg.get("data")?.get(0)?;
        let price = row.get("last")?.as_str()?.parse().ok()?;
        let received_at = row
            .get("ts")
            .and_then(|t| t.as_str())
            .and_then(|t| t.parse().ok())
            .unwrap_or_else(now_ms);
        Some(InboundQuote {
            identifier,
            price,
            received_at,
        })
    }

    fn heartbeat_text(&self) -> Option<String> {
        Some("ping".to_owned())
    }
}
