//! What a tick produced, and read-side snapshots of an account.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::meta::Meta;
use super::position::Position;
use crate::domain::market::CandleEvent;
use crate::domain::order::{OrderRecord, OrderSide, OrderStatus, Trade};
use crate::domain::shared::{Instrument, PlaygroundId};

/// One point on the equity curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquityPoint {
    /// Playground time.
    pub timestamp: DateTime<Utc>,
    /// Equity at that time.
    pub equity: Decimal,
}

/// Notable things that happened during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TickEvent {
    /// Positions were force-closed.
    Liquidation {
        /// Equity when liquidation started.
        equity: Decimal,
        /// Maintenance requirement when liquidation started.
        maintenance_margin: Decimal,
        /// Closing orders placed and filled.
        orders_placed: Vec<OrderRecord>,
    },
}

/// Result of `tick`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickDelta {
    /// Fills applied during the tick.
    pub new_trades: Vec<Trade>,
    /// Bars crossed by the clock.
    pub new_candles: Vec<CandleEvent>,
    /// Orders rejected or expired during the tick.
    pub invalid_orders: Vec<OrderRecord>,
    /// Liquidations and other events.
    pub events: Vec<TickEvent>,
    /// Clock after the tick.
    pub current_time: DateTime<Utc>,
    /// True once the clock reached its end.
    pub is_backtest_complete: bool,
    /// Equity points appended during the tick.
    pub equity_plot: Vec<EquityPoint>,
}

/// Selects which orders an account snapshot includes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderFilter {
    /// Include orders at all.
    #[serde(default)]
    pub fetch_orders: bool,
    /// Created at or after.
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    /// Created at or before.
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    /// Any of these statuses; empty means all.
    #[serde(default)]
    pub status: Vec<OrderStatus>,
    /// Any of these sides; empty means all.
    #[serde(default)]
    pub side: Vec<OrderSide>,
}

impl OrderFilter {
    /// Returns true if the order passes the filter.
    #[must_use]
    pub fn matches(&self, order: &OrderRecord) -> bool {
        self.from.is_none_or(|from| order.created_at() >= from)
            && self.to.is_none_or(|to| order.created_at() <= to)
            && (self.status.is_empty() || self.status.contains(&order.status()))
            && (self.side.is_empty() || self.side.contains(&order.side()))
    }
}

/// Read-side view of a playground account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountSnapshot {
    /// Playground.
    pub playground_id: PlaygroundId,
    /// Metadata.
    pub meta: Meta,
    /// Clock time.
    pub current_time: DateTime<Utc>,
    /// Cash balance.
    pub balance: Decimal,
    /// Balance plus marked positions.
    pub equity: Decimal,
    /// Equity minus maintenance requirements.
    pub free_margin: Decimal,
    /// Open positions.
    pub positions: BTreeMap<Instrument, Position>,
    /// Orders passing the filter.
    pub orders: Vec<OrderRecord>,
}
