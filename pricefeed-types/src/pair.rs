use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised when constructing a [`Pair`] from invalid symbols.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PairError {
    /// One of the two symbols was empty.
    #[error("currency symbol must not be empty")]
    EmptySymbol,
}

/// An ordered currency pair `(base, quote)`.
///
/// Symbols are case-preserved; adapters that need a particular casing or a
/// provider-specific alias rewrite internally and keep the caller's symbols
/// on the returned quote. On the wire a pair is a two-element array, e.g.
/// `["BTC","USD"]`; in logs it reads `BTC/USD`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub struct Pair {
    base: String,
    quote: String,
}

impl Pair {
    /// Build a pair from base and quote symbols.
    ///
    /// # Errors
    /// Returns [`PairError::EmptySymbol`] if either symbol is empty.
    pub fn new(base: impl Into<String>, quote: impl Into<String>) -> Result<Self, PairError> {
        let base = base.into();
        let quote = quote.into();
        if base.is_empty() || quote.is_empty() {
            return Err(PairError::EmptySymbol);
        }
        Ok(Self { base, quote })
    }

    /// The base symbol, as given by the caller.
    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// The quote symbol, as given by the caller.
    #[must_use]
    pub fn quote(&self) -> &str {
        &self.quote
    }
}

impl std::fmt::Display for Pair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

impl TryFrom<(String, String)> for Pair {
    type Error = PairError;

    fn try_from((base, quote): (String, String)) -> Result<Self, Self::Error> {
        Self::new(base, quote)
    }
}

impl From<Pair> for (String, String) {
    fn from(p: Pair) -> Self {
        (p.base, p.quote)
    }
}
