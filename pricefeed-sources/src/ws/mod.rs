//! Vendor wire dialects for the streaming-capable sources.
//!
//! Each type implements `WireProtocol`: it names the endpoint, maps pairs
//! to wire identifiers, frames subscribe/unsubscribe messages, and extracts
//! quotes from inbound frames. The generic `StreamAdapter` does everything
//! else.

mod binance;
mod coinbase;
mod cryptocompare;
mod finnhub;
mod kraken;
mod okx;

pub use binance::BinanceWire;
pub use coinbase::CoinbaseWire;
pub use cryptocompare::CryptocompareWire;
pub use finnhub::FinnhubWire;
pub use kraken::KrakenWire;
pub use okx::OkxWire;
