//! Playground creation DTOs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::application::ports::PlaygroundSession;
use crate::domain::market::Candle;
use crate::domain::order::OrderIntent;
use crate::domain::playground::{AccountSnapshot, Environment, LiveSource};
use crate::domain::shared::{Instrument, PlaygroundId};

/// Starting account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountRequestDto {
    /// Starting balance.
    pub balance: Decimal,
    /// Broker account, for live playgrounds.
    #[serde(default)]
    pub source: Option<LiveSource>,
}

/// One candle feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRequestDto {
    /// Instrument.
    pub symbol: Instrument,
    /// Bar period.
    pub period_in_seconds: u32,
    /// Bars, oldest first. Live feeds may start empty.
    #[serde(default)]
    pub bars: Vec<Candle>,
    /// Indicators to compute.
    #[serde(default)]
    pub indicators: Vec<String>,
    /// Warm-up window readable before the start.
    #[serde(default)]
    pub history_in_days: u32,
}

/// Clock bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClockRequestDto {
    /// Clock start.
    pub start_date: DateTime<Utc>,
    /// Clock end; required for simulators.
    #[serde(default)]
    pub stop_date: Option<DateTime<Utc>>,
}

/// A historical order replayed into a new playground.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillOrderDto {
    /// The order.
    #[serde(flatten)]
    pub order: OrderIntent,
    /// Recorded fill price.
    pub price: Decimal,
    /// Recorded fill time.
    pub time: DateTime<Utc>,
}

/// `CreatePlayground` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatePlaygroundRequestDto {
    /// Environment.
    pub env: Environment,
    /// Starting account.
    pub account: AccountRequestDto,
    /// Candle feeds.
    #[serde(default)]
    pub repositories: Vec<RepositoryRequestDto>,
    /// Clock bounds.
    pub clock: ClockRequestDto,
    /// Orders to replay at creation.
    #[serde(default)]
    pub backfill_orders: Vec<BackfillOrderDto>,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Caller-chosen id.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Persist the playground as a session.
    #[serde(default)]
    pub save_to_db: bool,
}

/// `CreatePlayground` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePlaygroundResponseDto {
    /// New playground.
    pub playground_id: PlaygroundId,
    /// Account after backfill.
    pub account: AccountSnapshot,
    /// Session, when persisted.
    pub playground_session: Option<PlaygroundSession>,
}
