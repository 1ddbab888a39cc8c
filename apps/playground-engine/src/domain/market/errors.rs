//! Market data errors.

use chrono::{DateTime, Utc};

use crate::domain::shared::{Instrument, QueueError};

/// Errors raised by candle repositories.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CandleError {
    /// Period is not 1m, 5m, or a multiple of 15m.
    #[error("unsupported candle period: {0}s")]
    InvalidPeriod(u32),
    /// Bars are not strictly increasing.
    #[error("{symbol}: bar at {next} does not follow bar at {previous}")]
    NonIncreasingTimestamp {
        /// Feed instrument.
        symbol: Instrument,
        /// Previous bar time.
        previous: DateTime<Utc>,
        /// Offending bar time.
        next: DateTime<Utc>,
    },
    /// Read starts before the history window.
    #[error("{symbol}: {from} precedes history window starting {earliest}")]
    OutOfHistoryRange {
        /// Feed instrument.
        symbol: Instrument,
        /// Requested start.
        from: DateTime<Utc>,
        /// Earliest readable time.
        earliest: DateTime<Utc>,
    },
    /// No bar after the requested time.
    #[error("{symbol}: end of stream")]
    EndOfStream {
        /// Feed instrument.
        symbol: Instrument,
    },
    /// `from` is after `to`.
    #[error("invalid range: {from} is after {to}")]
    InvalidRange {
        /// Range start.
        from: DateTime<Utc>,
        /// Range end.
        to: DateTime<Utc>,
    },
    /// The repository for a feed does not exist.
    #[error("no candle repository for {symbol} {period_seconds}s")]
    RepositoryNotFound {
        /// Feed instrument.
        symbol: Instrument,
        /// Feed period in seconds.
        period_seconds: u32,
    },
    /// Indicator name is not recognized.
    #[error("unknown indicator: {0}")]
    UnknownIndicator(String),
    /// New-candle notification could not be queued.
    #[error(transparent)]
    Queue(#[from] QueueError),
}
