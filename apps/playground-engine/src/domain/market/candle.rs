//! Bars, bar periods, and new-candle notifications.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::Instrument;

use super::errors::CandleError;

/// Immutable OHLCV bar with an optional overlay of named indicator values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// Bar open time.
    pub timestamp: DateTime<Utc>,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Traded volume.
    #[serde(default)]
    pub volume: Decimal,
    /// Indicator columns, e.g. `supertrend_upper`, `rsi`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indicators: BTreeMap<String, f64>,
}

impl Candle {
    /// Build a flat bar where open, high, low and close are all `price`.
    #[must_use]
    pub fn flat(timestamp: DateTime<Utc>, price: Decimal) -> Self {
        Self {
            timestamp,
            open: price,
            high: price,
            low: price,
            close: price,
            volume: Decimal::ZERO,
            indicators: BTreeMap::new(),
        }
    }

    /// Attach an indicator value.
    #[must_use]
    pub fn with_indicator(mut self, name: impl Into<String>, value: f64) -> Self {
        self.indicators.insert(name.into(), value);
        self
    }
}

/// Bar period in seconds.
///
/// Supported periods are 1 minute, 5 minutes, and multiples of 15 minutes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Period(u32);

impl Period {
    /// One-minute bars.
    pub const ONE_MINUTE: Self = Self(60);
    /// Five-minute bars.
    pub const FIVE_MINUTES: Self = Self(300);
    /// Fifteen-minute bars.
    pub const FIFTEEN_MINUTES: Self = Self(900);

    /// Create a period from seconds.
    pub fn from_seconds(seconds: u32) -> Result<Self, CandleError> {
        if seconds == 60 || seconds == 300 || (seconds > 0 && seconds % 900 == 0) {
            Ok(Self(seconds))
        } else {
            Err(CandleError::InvalidPeriod(seconds))
        }
    }

    /// Period length in seconds.
    #[must_use]
    pub const fn seconds(self) -> u32 {
        self.0
    }

    /// Period as a chrono duration.
    #[must_use]
    pub fn as_duration(self) -> Duration {
        Duration::seconds(i64::from(self.0))
    }
}

impl TryFrom<u32> for Period {
    type Error = CandleError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::from_seconds(value)
    }
}

impl From<Period> for u32 {
    fn from(value: Period) -> Self {
        value.0
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// A bar crossed by the cursor, tagged with its feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleEvent {
    /// Instrument of the feed.
    pub symbol: Instrument,
    /// Period of the feed.
    pub period: Period,
    /// The new bar.
    pub bar: Candle,
}
