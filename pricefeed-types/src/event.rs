use serde::Serialize;

use crate::pair::Pair;
use crate::source::SourceName;

/// Tracked-pair bookkeeping, one row per `(source, pair)`.
///
/// Timestamps are epoch milliseconds. `registered_at <= last_request_at`
/// always holds; response stamps never run ahead of the clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    /// The tracked pair.
    pub pair: Pair,
    /// The source the pair is tracked against.
    pub source: SourceName,
    /// When tracking began.
    pub registered_at: i64,
    /// Last time a caller asked for this pair.
    pub last_request_at: i64,
    /// Last time any fetch (REST or stream) succeeded.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_response_at: Option<i64>,
    /// Last time a REST fetch was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetch_at: Option<i64>,
}

/// Change notifications emitted by the pair registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// A `(source, pair)` combination is now tracked.
    PairAdded {
        /// Source the pair was added under.
        source: SourceName,
        /// The added pair.
        pair: Pair,
    },
    /// A `(source, pair)` combination is no longer tracked.
    PairRemoved {
        /// Source the pair was removed from.
        source: SourceName,
        /// The removed pair.
        pair: Pair,
    },
}

/// Lifecycle states of a WebSocket connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not yet connected.
    Idle,
    /// Dialing the endpoint.
    Connecting,
    /// Connected and healthy.
    Open,
    /// Graceful close in progress.
    Closing,
    /// Closed; no reconnect pending.
    Closed,
    /// Dropped; a reconnect attempt is scheduled.
    Reconnecting,
}
