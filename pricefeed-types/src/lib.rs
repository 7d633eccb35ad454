//! pricefeed-types
//!
//! Plain data structures shared across the pricefeed workspace.
//!
//! - `pair`: the ordered `(base, quote)` currency pair.
//! - `quote`: the `PriceQuote` reading with provenance.
//! - `source`: the enumeration of supported market-data providers.
//! - `config`: per-source and application configuration.
//! - `event`: registry events, registrations, connection states.
#![warn(missing_docs)]

pub mod config;
pub mod event;
pub mod pair;
pub mod quote;
pub mod source;

pub use config::{AppConfig, ConfigError, ProxySetting, SourceConfig, StreamOptions};
pub use event::{ConnectionState, Registration, RegistryEvent};
pub use pair::{Pair, PairError};
pub use quote::{PriceQuote, now_ms};
pub use source::SourceName;
