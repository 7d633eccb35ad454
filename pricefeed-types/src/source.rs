use serde::{Deserialize, Serialize};

/// The market-data providers the aggregator knows how to speak to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum SourceName {
    /// Alpha Vantage FX rates (key required).
    #[serde(rename = "alphavantage")]
    AlphaVantage,
    /// Binance spot tickers.
    #[serde(rename = "binance")]
    Binance,
    /// Coinbase spot prices.
    #[serde(rename = "coinbase")]
    Coinbase,
    /// CoinGecko simple prices (symbol to id mapping required).
    #[serde(rename = "coingecko")]
    Coingecko,
    /// CryptoCompare prices.
    #[serde(rename = "cryptocompare")]
    Cryptocompare,
    /// exchangerate.host FX rates (key optional).
    #[serde(rename = "exchangerate-host")]
    ExchangerateHost,
    /// Finnhub quotes (token required).
    #[serde(rename = "finnhub")]
    Finnhub,
    /// Frankfurter FX rates.
    #[serde(rename = "frankfurter")]
    Frankfurter,
    /// Kraken public tickers.
    #[serde(rename = "kraken")]
    Kraken,
    /// OKX market tickers.
    #[serde(rename = "okx")]
    Okx,
}

impl SourceName {
    /// All supported sources, in stable order.
    pub const ALL: [Self; 10] = [
        Self::AlphaVantage,
        Self::Binance,
        Self::Coinbase,
        Self::Coingecko,
        Self::Cryptocompare,
        Self::ExchangerateHost,
        Self::Finnhub,
        Self::Frankfurter,
        Self::Kraken,
        Self::Okx,
    ];

    /// The stable identifier used in config files, URLs and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AlphaVantage => "alphavantage",
            Self::Binance => "binance",
            Self::Coinbase => "coinbase",
            Self::Coingecko => "coingecko",
            Self::Cryptocompare => "cryptocompare",
            Self::ExchangerateHost => "exchangerate-host",
            Self::Finnhub => "finnhub",
            Self::Frankfurter => "frankfurter",
            Self::Kraken => "kraken",
            Self::Okx => "okx",
        }
    }
}

impl std::fmt::Display for SourceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::error::Error for SourceName {}

impl std::str::FromStr for SourceName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or(())
    }
}
