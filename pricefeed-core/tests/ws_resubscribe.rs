//! Drives a `StreamAdapter` against a local WebSocket server to exercise
//! the reconnect path end to end: subscribe, drop the socket, observe one
//! batched resubscription, and see quotes flow again.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pricefeed_core::stream::{InboundQuote, StreamAdapter, WireProtocol};
use pricefeed_core::{QuoteHandler, StreamQuoteProvider};
use pricefeed_types::{Pair, PriceQuote, SourceName, StreamOptions};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

struct TestProtocol {
    endpoint: String,
}

impl WireProtocol for TestProtocol {
    fn source(&self) -> SourceName {
        SourceName::Binance
    }

    fn endpoint(&self) -> String {
        self.endpoint.clone()
    }

    fn identifier(&self, pair: &Pair) -> String {
        format!("{}{}", pair.base(), pair.quote()).to_lowercase()
    }

    fn subscribe_frames(&self, idents: &[String]) -> Vec<String> {
        vec![serde_json::json!({"op": "subscribe", "args": idents}).to_string()]
    }

    fn unsubscribe_frames(&self, idents: &[String]) -> Vec<String> {
        vec![serde_json::json!({"op": "unsubscribe", "args": idents}).to_string()]
    }

    fn parse(&self, msg: &serde_json::Value) -> Option<InboundQuote> {
        Some(InboundQuote {
            identifier: msg.get("ident")?.as_str()?.to_owned(),
            price: msg.get("price")?.as_str()?.parse().ok()?,
            received_at: msg.get("ts")?.as_i64()?,
        })
    }
}

enum ServerCmd {
    Push(String),
    DropConnection,
}

/// Accepts one client at a time, forwarding received frames out and pushed
/// frames in; `DropConnection` severs the socket without a close frame.
async fn run_server(
    listener: TcpListener,
    frames_tx: mpsc::UnboundedSender<serde_json::Value>,
    mut cmd_rx: mpsc::UnboundedReceiver<ServerCmd>,
) {
    loop {
        let Ok((stream, _)) = listener.accept().await else {
            return;
        };
        let Ok(mut ws) = accept_async(stream).await else {
            continue;
        };
        loop {
            tokio::select! {
                inbound = ws.next() => match inbound {
                    Some(Ok(Message::Text(text))) => {
                        if let Ok(value) = serde_json::from_str(&text) {
                            let _ = frames_tx.send(value);
                        }
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        let _ = ws.send(Message::Pong(payload)).await;
                    }
                    Some(Ok(_)) => {}
                    _ => break,
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(ServerCmd::Push(text)) => {
                        let _ = ws.send(Message::Text(text)).await;
                    }
                    Some(ServerCmd::DropConnection) => break,
                    None => return,
                },
            }
        }
        drop(ws);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reconnect_restores_the_subscribed_set_in_one_batch() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_server(listener, frames_tx, cmd_rx));

    let opts = StreamOptions {
        reconnect_interval_ms: 100,
        heartbeat_interval_ms: 30_000,
        ..StreamOptions::default()
    };
    let adapter = StreamAdapter::new(TestProtocol { endpoint }, opts);

    let (quote_tx, mut quote_rx) = mpsc::unbounded_channel::<PriceQuote>();
    let on_quote: QuoteHandler = Arc::new(move |q| {
        let _ = quote_tx.send(q);
    });

    let pairs = vec![
        Pair::new("BTC", "USD").unwrap(),
        Pair::new("ETH", "USD").unwrap(),
    ];
    adapter.subscribe_many(&pairs, on_quote).await.unwrap();

    // One batched subscribe frame with both identifiers.
    let frame = timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame["op"], "subscribe");
    assert_eq!(frame["args"], serde_json::json!(["btcusd", "ethusd"]));

    // Quotes flow to the handler with the caller's pair restored.
    cmd_tx
        .send(ServerCmd::Push(
            serde_json::json!({"ident": "btcusd", "price": "67890.12", "ts": 1_700_000_000_000_i64})
                .to_string(),
        ))
        .unwrap();
    let quote = timeout(Duration::from_secs(5), quote_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(quote.pair, pairs[0]);
    assert_eq!(quote.price.to_string(), "67890.12");

    let before = adapter.core().subscribed_identifiers();

    // Sever the socket; the client reconnects and replays the set.
    cmd_tx.send(ServerCmd::DropConnection).unwrap();
    let resub = timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .expect("no resubscription before timeout")
        .unwrap();
    assert_eq!(resub["op"], "subscribe");
    assert_eq!(resub["args"], serde_json::json!(["btcusd", "ethusd"]));
    assert_eq!(adapter.core().subscribed_identifiers(), before);

    // No second resubscription frame follows.
    assert!(
        timeout(Duration::from_millis(300), frames_rx.recv())
            .await
            .is_err(),
        "expected exactly one resubscription frame"
    );

    // Quotes resume on the new connection.
    cmd_tx
        .send(ServerCmd::Push(
            serde_json::json!({"ident": "ethusd", "price": "3500.5", "ts": 1_700_000_000_500_i64})
                .to_string(),
        ))
        .unwrap();
    let quote = timeout(Duration::from_secs(5), quote_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(quote.pair, pairs[1]);

    adapter.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unsubscribe_fires_once_per_wire_identifier() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("ws://{}", listener.local_addr().unwrap());
    let (frames_tx, mut frames_rx) = mpsc::unbounded_channel();
    let (_cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ServerCmd>();
    tokio::spawn(run_server(listener, frames_tx, cmd_rx));

    let adapter = StreamAdapter::new(
        TestProtocol { endpoint },
        StreamOptions {
            heartbeat_interval_ms: 30_000,
            ..StreamOptions::default()
        },
    );
    let on_quote: QuoteHandler = Arc::new(|_q| {});

    let btc = Pair::new("BTC", "USD").unwrap();
    let id_a = adapter
        .subscribe(&btc, Arc::clone(&on_quote), None)
        .await
        .unwrap();
    let id_b = adapter
        .subscribe(&btc, Arc::clone(&on_quote), None)
        .await
        .unwrap();

    // One wire subscribe for two subscriptions of the same pair.
    let frame = timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame["args"], serde_json::json!(["btcusd"]));

    // First unsubscribe keeps the wire key; the second releases it.
    adapter.unsubscribe(id_a).await.unwrap();
    assert!(
        timeout(Duration::from_millis(300), frames_rx.recv())
            .await
            .is_err()
    );
    adapter.unsubscribe(id_b).await.unwrap();
    let frame = timeout(Duration::from_secs(5), frames_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(frame["op"], "unsubscribe");
    assert_eq!(frame["args"], serde_json::json!(["btcusd"]));

    adapter.shutdown().await;
}
