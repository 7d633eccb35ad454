//! Reconnecting WebSocket client used by streaming adapters.
//!
//! One driver task owns the socket: it dials, pumps inbound frames into a
//! typed event channel, answers pings, sends heartbeats, and reconnects
//! with linear backoff until the attempt budget runs out. Outbound frames
//! go through a command channel and an optional send-side rate limit.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

use crate::FeedError;
use pricefeed_types::{ConnectionState, SourceName, StreamOptions};

/// Outbound frame budget: at most `per_interval` frames per `interval`.
#[derive(Debug, Clone, Copy)]
pub struct SendLimit {
    /// Frames admitted per window.
    pub per_interval: u32,
    /// Window length.
    pub interval: Duration,
}

/// Connection settings for one WebSocket endpoint.
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// The `wss://` endpoint.
    pub url: String,
    /// Reconnect automatically after a drop.
    pub auto_reconnect: bool,
    /// Delay between reconnect attempts (linear backoff).
    pub reconnect_interval: Duration,
    /// Consecutive failed reconnects tolerated before giving up.
    pub max_reconnect_attempts: u32,
    /// Heartbeat cadence.
    pub heartbeat_interval: Duration,
    /// Force-close when no pong (or any traffic) arrives within this after
    /// a heartbeat.
    pub pong_timeout: Duration,
    /// Vendor ping convention: send this text frame instead of a WS ping.
    pub heartbeat_text: Option<String>,
    /// Parse inbound text frames as JSON before emitting.
    pub parse_json: bool,
    /// Outbound frame budget for subscribe/unsubscribe traffic.
    pub send_limit: Option<SendLimit>,
}

impl WsConfig {
    /// Derive a connection config from per-source stream options.
    #[must_use]
    pub fn from_stream_options(url: impl Into<String>, opts: &StreamOptions) -> Self {
        let send_limit = match (opts.rate_limit_per_interval, opts.rate_limit_interval_ms) {
            (Some(per), Some(ms)) if per > 0 && ms > 0 => Some(SendLimit {
                per_interval: per,
                interval: Duration::from_millis(ms),
            }),
            _ => None,
        };
        Self {
            url: url.into(),
            auto_reconnect: opts.auto_reconnect,
            reconnect_interval: Duration::from_millis(opts.reconnect_interval_ms),
            max_reconnect_attempts: opts.max_reconnect_attempts,
            heartbeat_interval: Duration::from_millis(opts.heartbeat_interval_ms),
            pong_timeout: Duration::from_millis(opts.heartbeat_interval_ms.saturating_mul(2)),
            heartbeat_text: None,
            parse_json: true,
            send_limit,
        }
    }
}

/// Events emitted by the connection driver.
#[derive(Debug, Clone)]
pub enum WsEvent {
    /// First successful connect.
    Open,
    /// Connection re-established after a drop; subscriptions must be
    /// restored by the owner.
    Reconnected,
    /// Inbound frame, parsed as JSON.
    Message(serde_json::Value),
    /// Inbound frame that was not JSON (or `parse_json` is off).
    Text(String),
    /// Connection-level failure. Terminal when followed by `Closed`.
    Error(String),
    /// Driver finished; no further events follow.
    Closed,
}

enum WsCommand {
    Send(String),
    Close,
}

/// Handle to a driver task owning one reconnecting connection.
#[derive(Clone)]
pub struct WsClient {
    cmd_tx: mpsc::Sender<WsCommand>,
    state_rx: watch::Receiver<ConnectionState>,
}

impl WsClient {
    /// Spawn the connection driver. Events arrive on the returned receiver;
    /// the connection dials immediately.
    #[must_use]
    pub fn spawn(source: SourceName, cfg: WsConfig) -> (Self, mpsc::Receiver<WsEvent>) {
        let (cmd_tx, cmd_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Idle);
        tokio::spawn(drive(source, cfg, cmd_rx, event_tx, state_tx));
        (Self { cmd_tx, state_rx }, event_rx)
    }

    /// Queue an outbound text frame.
    ///
    /// # Errors
    /// Returns `ShuttingDown` when the driver has exited.
    pub async fn send(&self, frame: String) -> Result<(), FeedError> {
        self.cmd_tx
            .send(WsCommand::Send(frame))
            .await
            .map_err(|_| FeedError::ShuttingDown)
    }

    /// Request a graceful close; the driver stops reconnecting.
    pub async fn close(&self) {
        let _ = self.cmd_tx.send(WsCommand::Close).await;
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state_rx.borrow()
    }

    /// Watch connection state changes.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }
}

struct SendWindow {
    sent: u32,
    window_start: Instant,
}

impl SendWindow {
    fn new() -> Self {
        Self {
            sent: 0,
            window_start: Instant::now(),
        }
    }

    async fn admit(&mut self, limit: SendLimit) {
        let now = Instant::now();
        if now.duration_since(self.window_start) >= limit.interval {
            self.window_start = now;
            self.sent = 0;
        }
        if self.sent >= limit.per_interval {
            let wait = limit
                .interval
                .saturating_sub(now.duration_since(self.window_start));
            tokio::time::sleep(wait).await;
            self.window_start = Instant::now();
            self.sent = 0;
        }
        self.sent += 1;
    }
}

#[allow(clippy::too_many_lines)]
async fn drive(
    source: SourceName,
    cfg: WsConfig,
    mut cmd_rx: mpsc::Receiver<WsCommand>,
    event_tx: mpsc::Sender<WsEvent>,
    state_tx: watch::Sender<ConnectionState>,
) {
    let mut attempts = 0u32;
    let mut ever_connected = false;
    let mut closing = false;
    let mut send_window = SendWindow::new();

    loop {
        state_tx.send_replace(ConnectionState::Connecting);
        match connect_async(cfg.url.as_str()).await {
            Ok((mut stream, _)) => {
                attempts = 0;
                state_tx.send_replace(ConnectionState::Open);
                let opened = if ever_connected {
                    WsEvent::Reconnected
                } else {
                    WsEvent::Open
                };
                ever_connected = true;
                if event_tx.send(opened).await.is_err() {
                    closing = true;
                }

                let mut heartbeat = tokio::time::interval(cfg.heartbeat_interval);
                heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                heartbeat.reset();
                let mut last_seen = Instant::now();

                while !closing {
                    tokio::select! {
                        cmd = cmd_rx.recv() => match cmd {
                            Some(WsCommand::Send(frame)) => {
                                if let Some(limit) = cfg.send_limit {
                                    send_window.admit(limit).await;
                                }
                                if let Err(e) = stream.send(Message::Text(frame)).await {
                                    let _ = event_tx.send(WsEvent::Error(format!("send failed: {e}"))).await;
                                    break;
                                }
                            }
                            Some(WsCommand::Close) | None => {
                                closing = true;
                                state_tx.send_replace(ConnectionState::Closing);
                                let _ = stream.close(None).await;
                            }
                        },
                        inbound = stream.next() => match inbound {
                            Some(Ok(Message::Text(text))) => {
                                last_seen = Instant::now();
                                let event = if cfg.parse_json {
                                    match serde_json::from_str(&text) {
                                        Ok(value) => WsEvent::Message(value),
                                        Err(_) => WsEvent::Text(text),
                                    }
                                } else {
                                    WsEvent::Text(text)
                                };
                                if event_tx.send(event).await.is_err() {
                                    closing = true;
                                }
                            }
                            Some(Ok(Message::Ping(payload))) => {
                                last_seen = Instant::now();
                                let _ = stream.send(Message::Pong(payload)).await;
                            }
                            Some(Ok(Message::Pong(_))) => {
                                last_seen = Instant::now();
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                if !closing {
                                    warn!(target = "pricefeed::ws", %source, "connection closed by peer");
                                    let _ = event_tx.send(WsEvent::Error("closed by peer".to_owned())).await;
                                }
                                break;
                            }
                            Some(Ok(_)) => {}
                            Some(Err(e)) => {
                                let _ = event_tx.send(WsEvent::Error(e.to_string())).await;
                                break;
                            }
                        },
                        _ = heartbeat.tick() => {
                            if last_seen.elapsed() > cfg.heartbeat_interval + cfg.pong_timeout {
                                warn!(target = "pricefeed::ws", %source, "pong timeout, forcing close");
                                let _ = event_tx.send(WsEvent::Error("pong timeout".to_owned())).await;
                                let _ = stream.close(None).await;
                                break;
                            }
                            let ping = cfg.heartbeat_text.as_ref().map_or_else(
                                || Message::Ping(Vec::new()),
                                |text| Message::Text(text.clone()),
                            );
                            if stream.send(ping).await.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                debug!(target = "pricefeed::ws", %source, error = %e, "connect failed");
                let _ = event_tx
                    .send(WsEvent::Error(format!("connect failed: {e}")))
                    .await;
            }
        }

        if closing || !cfg.auto_reconnect {
            break;
        }
        attempts += 1;
        if attempts > cfg.max_reconnect_attempts {
            let _ = event_tx
                .send(WsEvent::Error("reconnect attempts exhausted".to_owned()))
                .await;
            break;
        }
        state_tx.send_replace(ConnectionState::Reconnecting);
        let deadline = tokio::time::sleep(cfg.reconnect_interval);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                () = &mut deadline => break,
                cmd = cmd_rx.recv() => match cmd {
                    Some(WsCommand::Close) | None => {
                        closing = true;
                        break;
                    }
                    // Frames queued while down are dropped; the owner
                    // resubscribes from scratch on `Reconnected`.
                    Some(WsCommand::Send(_)) => {}
                },
            }
        }
        if closing {
            break;
        }
    }

    state_tx.send_replace(ConnectionState::Closed);
    let _ = event_tx.send(WsEvent::Closed).await;
}
