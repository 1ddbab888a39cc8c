//! Tick, account, and candle DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::market::Candle;
use crate::domain::playground::OrderFilter;
use crate::domain::shared::{Instrument, PlaygroundId};

/// `NextTick` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextTickRequestDto {
    /// Playground.
    pub playground_id: PlaygroundId,
    /// Seconds to advance.
    pub seconds: i64,
    /// Compute the tick without committing it.
    #[serde(default)]
    pub is_preview: bool,
}

/// `GetAccount` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetAccountRequestDto {
    /// Playground.
    pub playground_id: PlaygroundId,
    /// Which orders to include.
    #[serde(flatten)]
    pub filter: OrderFilter,
}

/// `GetCandles` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GetCandlesRequestDto {
    /// Playground.
    pub playground_id: PlaygroundId,
    /// Instrument.
    pub symbol: Instrument,
    /// Feed period.
    pub period_in_seconds: u32,
    /// Range start, inclusive.
    pub from: DateTime<Utc>,
    /// Range end, inclusive.
    pub to: DateTime<Utc>,
}

/// `GetCandles` response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetCandlesResponseDto {
    /// Instrument.
    pub symbol: Instrument,
    /// Feed period.
    pub period_in_seconds: u32,
    /// Bars in the range, clamped to the cursor.
    pub candles: Vec<Candle>,
}

/// `AppendBars` request: new bars from a live feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppendBarsRequestDto {
    /// Instrument.
    pub symbol: Instrument,
    /// Feed period.
    pub period_in_seconds: u32,
    /// Bars strictly after the last stored bar.
    pub bars: Vec<Candle>,
}

/// `AppendBars` response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppendBarsResponseDto {
    /// Bars stored.
    pub appended: usize,
    /// Live playgrounds notified.
    pub subscribers: usize,
}
