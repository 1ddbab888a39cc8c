//! Instrument value object.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A tradeable instrument, identified by its ticker.
///
/// Equality is by ticker; tickers are normalized to uppercase.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct Instrument(String);

impl Instrument {
    /// Create a new instrument from a ticker.
    #[must_use]
    pub fn new(ticker: impl Into<String>) -> Self {
        Self(ticker.into().trim().to_uppercase())
    }

    /// Get the ticker.
    #[must_use]
    pub fn ticker(&self) -> &str {
        &self.0
    }

    /// Returns true if the ticker is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Instrument {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Instrument {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ticker_is_normalized() {
        let aapl = Instrument::new(" aapl ");
        assert_eq!(aapl.ticker(), "AAPL");
        assert_eq!(aapl, Instrument::from("AAPL"));
    }

    #[test]
    fn empty_ticker() {
        assert!(Instrument::new("  ").is_empty());
        assert!(!Instrument::new("SPY").is_empty());
    }
}
