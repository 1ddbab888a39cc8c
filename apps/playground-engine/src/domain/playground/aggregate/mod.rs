//! Playground Aggregate Root
//!
//! A playground owns its balance, orders, trades, candle repositories, clock,
//! and outbound queues. Positions are folded from the trade ledger on read.
//! Balance changes only through fills (`commit_pending_order`) and
//! liquidation.

mod fills;
mod placement;
mod tick;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use fills::{FillEntry, FillOutcome};

use super::errors::PlaygroundError;
use super::meta::{Environment, Meta};
use super::position::{Lot, Position, fold_lots};
use super::tick_delta::{AccountSnapshot, EquityPoint, OrderFilter};
use crate::domain::market::{Candle, CandleError, CandleEvent, CandleRepository, Clock, Period};
use crate::domain::order::{CloseLink, OrderRecord, OrderSide, Trade};
use crate::domain::shared::{EventQueue, ExternalOrderId, Instrument, OrderId, OrderRef, PlaygroundId};

/// Persisted form of a playground. Queues are not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaygroundSnapshot {
    /// Playground id.
    pub id: PlaygroundId,
    /// Metadata.
    pub meta: Meta,
    /// Clock state.
    pub clock: Clock,
    /// Cash balance.
    pub balance: Decimal,
    /// Candle feeds.
    pub repositories: Vec<CandleRepository>,
    /// Orders in placement order.
    pub orders: Vec<OrderRecord>,
    /// Trade ledger in fill order.
    pub trades: Vec<Trade>,
    /// Equity curve.
    pub equity_plot: Vec<EquityPoint>,
}

/// Playground aggregate root.
#[derive(Debug)]
pub struct Playground {
    id: PlaygroundId,
    meta: Meta,
    clock: Clock,
    balance: Decimal,
    repositories: Vec<CandleRepository>,
    orders: Vec<OrderRecord>,
    trades: Vec<Trade>,
    equity_plot: Vec<EquityPoint>,
    new_trades: Arc<EventQueue<Trade>>,
    new_candles: Arc<EventQueue<CandleEvent>>,
}

impl Playground {
    /// Create a playground. The balance starts at `meta.starting_balance`.
    pub fn new(
        id: PlaygroundId,
        meta: Meta,
        clock: Clock,
        repositories: Vec<CandleRepository>,
        queue_capacity: usize,
    ) -> Result<Self, PlaygroundError> {
        meta.validate()?;
        Ok(Self {
            id,
            balance: meta.starting_balance,
            meta,
            clock,
            repositories,
            orders: Vec::new(),
            trades: Vec::new(),
            equity_plot: Vec::new(),
            new_trades: Arc::new(EventQueue::new("new_trades", queue_capacity)),
            new_candles: Arc::new(EventQueue::new("new_candles", queue_capacity)),
        })
    }

    /// Rebuild a playground from its persisted form.
    pub fn restore(
        snapshot: PlaygroundSnapshot,
        queue_capacity: usize,
    ) -> Result<Self, PlaygroundError> {
        snapshot.meta.validate()?;
        Ok(Self {
            id: snapshot.id,
            meta: snapshot.meta,
            clock: snapshot.clock,
            balance: snapshot.balance,
            repositories: snapshot.repositories,
            orders: snapshot.orders,
            trades: snapshot.trades,
            equity_plot: snapshot.equity_plot,
            new_trades: Arc::new(EventQueue::new("new_trades", queue_capacity)),
            new_candles: Arc::new(EventQueue::new("new_candles", queue_capacity)),
        })
    }

    /// Persisted form of the playground.
    #[must_use]
    pub fn snapshot(&self) -> PlaygroundSnapshot {
        PlaygroundSnapshot {
            id: self.id.clone(),
            meta: self.meta.clone(),
            clock: self.clock.clone(),
            balance: self.balance,
            repositories: self.repositories.clone(),
            orders: self.orders.clone(),
            trades: self.trades.clone(),
            equity_plot: self.equity_plot.clone(),
        }
    }

    /// A copy with the same state and fresh, empty queues.
    #[must_use]
    pub fn detached_copy(&self) -> Self {
        Self {
            id: self.id.clone(),
            meta: self.meta.clone(),
            clock: self.clock.clone(),
            balance: self.balance,
            repositories: self.repositories.clone(),
            orders: self.orders.clone(),
            trades: self.trades.clone(),
            equity_plot: self.equity_plot.clone(),
            new_trades: Arc::new(EventQueue::new("new_trades", self.new_trades.capacity())),
            new_candles: Arc::new(EventQueue::new("new_candles", self.new_candles.capacity())),
        }
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Playground id.
    #[must_use]
    pub const fn id(&self) -> &PlaygroundId {
        &self.id
    }

    /// Metadata.
    #[must_use]
    pub const fn meta(&self) -> &Meta {
        &self.meta
    }

    /// Environment.
    #[must_use]
    pub const fn environment(&self) -> Environment {
        self.meta.environment
    }

    /// Clock.
    #[must_use]
    pub const fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Current playground time.
    #[must_use]
    pub const fn current_time(&self) -> DateTime<Utc> {
        self.clock.current_time()
    }

    /// Cash balance.
    #[must_use]
    pub const fn balance(&self) -> Decimal {
        self.balance
    }

    /// Balance at creation.
    #[must_use]
    pub const fn starting_balance(&self) -> Decimal {
        self.meta.starting_balance
    }

    /// Candle feeds.
    #[must_use]
    pub fn repositories(&self) -> &[CandleRepository] {
        &self.repositories
    }

    /// Orders in placement order.
    #[must_use]
    pub fn orders(&self) -> &[OrderRecord] {
        &self.orders
    }

    /// Trade ledger.
    #[must_use]
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Equity curve.
    #[must_use]
    pub fn equity_plot(&self) -> &[EquityPoint] {
        &self.equity_plot
    }

    /// Queue the reconciler feeds with live fills.
    #[must_use]
    pub fn new_trades_queue(&self) -> Arc<EventQueue<Trade>> {
        Arc::clone(&self.new_trades)
    }

    /// Queue live candle feeds publish into.
    #[must_use]
    pub fn new_candles_queue(&self) -> Arc<EventQueue<CandleEvent>> {
        Arc::clone(&self.new_candles)
    }

    /// Queue a fill for the next tick to report.
    pub fn enqueue_new_trade(&self, trade: Trade) -> Result<(), PlaygroundError> {
        self.new_trades.enqueue(trade)?;
        Ok(())
    }

    // ========================================================================
    // Accounting
    // ========================================================================

    /// Latest observable close for an instrument, from its smallest-period feed.
    #[must_use]
    pub fn current_price(&self, symbol: &Instrument) -> Option<Decimal> {
        self.repositories
            .iter()
            .filter(|r| r.symbol() == symbol)
            .min_by_key(|r| r.period())
            .and_then(CandleRepository::latest_close)
    }

    fn lots(&self) -> BTreeMap<Instrument, Lot> {
        fold_lots(&self.trades)
    }

    /// Open positions marked to the latest close.
    #[must_use]
    pub fn positions(&self) -> BTreeMap<Instrument, Position> {
        self.lots()
            .into_iter()
            .map(|(symbol, lot)| {
                let mark = self.current_price(&symbol);
                (symbol, Position::from_lot(lot, mark))
            })
            .collect()
    }

    /// Signed filled quantity for an instrument.
    #[must_use]
    pub fn position_quantity(&self, symbol: &Instrument) -> Decimal {
        self.trades
            .iter()
            .filter(|t| t.symbol() == symbol)
            .map(Trade::quantity)
            .sum()
    }

    /// Signed quantity still to fill on working orders for an instrument.
    #[must_use]
    pub fn pending_quantity(&self, symbol: &Instrument) -> Decimal {
        self.orders
            .iter()
            .filter(|o| o.symbol() == symbol && o.status().is_trading_allowed())
            .map(|o| o.side().signed(o.remaining_quantity()))
            .sum()
    }

    /// Balance plus the market value of open positions.
    #[must_use]
    pub fn equity(&self) -> Decimal {
        equity_of(self.balance, &self.positions())
    }

    /// Sum of maintenance requirements.
    #[must_use]
    pub fn maintenance_margin(&self) -> Decimal {
        self.positions().values().map(|p| p.maintenance_margin).sum()
    }

    /// Equity minus maintenance requirements.
    #[must_use]
    pub fn free_margin(&self) -> Decimal {
        let positions = self.positions();
        equity_of(self.balance, &positions) - positions.values().map(|p| p.maintenance_margin).sum::<Decimal>()
    }

    /// Read-side account view.
    #[must_use]
    pub fn account(&self, filter: &OrderFilter) -> AccountSnapshot {
        let positions = self.positions();
        let equity = equity_of(self.balance, &positions);
        let maintenance: Decimal = positions.values().map(|p| p.maintenance_margin).sum();
        let orders = if filter.fetch_orders {
            self.orders.iter().filter(|o| filter.matches(o)).cloned().collect()
        } else {
            Vec::new()
        };

        AccountSnapshot {
            playground_id: self.id.clone(),
            meta: self.meta.clone(),
            current_time: self.current_time(),
            balance: self.balance,
            equity,
            free_margin: equity - maintenance,
            positions,
            orders,
        }
    }

    /// Bars for a feed between `from` and `to`, inclusive.
    pub fn fetch_candles(
        &self,
        symbol: &Instrument,
        period: Period,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, PlaygroundError> {
        let repository = self
            .repositories
            .iter()
            .find(|r| r.symbol() == symbol && r.period() == period)
            .ok_or_else(|| CandleError::RepositoryNotFound {
                symbol: symbol.clone(),
                period_seconds: period.seconds(),
            })?;
        Ok(repository.fetch(from, to)?)
    }

    /// Move a live clock forward to wall time.
    pub fn sync_clock(&mut self, now: DateTime<Utc>) {
        self.clock.sync_to(now);
    }

    // ========================================================================
    // Orders
    // ========================================================================

    /// Look up an order.
    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<&OrderRecord> {
        self.orders.iter().find(|o| o.id() == order_id)
    }

    /// Look up an order by broker id.
    #[must_use]
    pub fn order_by_external_id(&self, external_id: &ExternalOrderId) -> Option<&OrderRecord> {
        self.orders
            .iter()
            .find(|o| o.external_id() == Some(external_id))
    }

    fn order_mut(&mut self, order_id: &OrderId) -> Result<&mut OrderRecord, PlaygroundError> {
        let playground_id = &self.id;
        self.orders
            .iter_mut()
            .find(|o| o.id() == order_id)
            .ok_or_else(|| PlaygroundError::OrderNotFound {
                playground_id: playground_id.clone(),
                order_id: order_id.clone(),
            })
    }

    /// Check that an order could be appended.
    pub fn can_append(&self, order: &OrderRecord) -> Result<(), PlaygroundError> {
        if order.playground_id() != &self.id {
            return Err(PlaygroundError::PlaygroundNotFound(order.playground_id().clone()));
        }

        if self.order(order.id()).is_some() {
            return Err(PlaygroundError::DuplicateOrder(order.id().clone()));
        }

        for link in order.closes() {
            if self.order(&link.order_id).is_none() {
                return Err(PlaygroundError::OrderNotFound {
                    playground_id: self.id.clone(),
                    order_id: link.order_id.clone(),
                });
            }
        }

        Ok(())
    }

    /// Append a pending order and record the volume it claims on the orders
    /// it closes.
    pub fn append_order(&mut self, order: OrderRecord) -> Result<(), PlaygroundError> {
        self.can_append(&order)?;
        for link in order.closes() {
            let closer = CloseLink::new(order.id().clone(), link.quantity);
            self.order_mut(&link.order_id)?.add_closed_by(closer);
        }
        self.orders.push(order);
        Ok(())
    }

    /// Link an order to an order in another playground.
    pub fn link_reconcile(
        &mut self,
        order_id: &OrderId,
        target: OrderRef,
    ) -> Result<(), PlaygroundError> {
        self.order_mut(order_id)?.add_reconcile(target);
        Ok(())
    }

    /// Record the broker id assigned when the order was routed.
    pub fn set_external_id(
        &mut self,
        order_id: &OrderId,
        external_id: ExternalOrderId,
    ) -> Result<(), PlaygroundError> {
        self.order_mut(order_id)?.set_external_id(external_id);
        Ok(())
    }

    /// `pending -> open`.
    pub fn accept_order(&mut self, order_id: &OrderId) -> Result<&OrderRecord, PlaygroundError> {
        let order = self.order_mut(order_id)?;
        order.accept()?;
        Ok(&*order)
    }

    /// Reject an order and release the volume it claimed.
    pub fn reject_order(
        &mut self,
        order_id: &OrderId,
        reason: &str,
    ) -> Result<&OrderRecord, PlaygroundError> {
        self.order_mut(order_id)?.reject(reason)?;
        self.release_closes(order_id)?;
        self.order_mut(order_id).map(|o| &*o)
    }

    /// Cancel an order and release the volume it claimed.
    pub fn cancel_order(&mut self, order_id: &OrderId) -> Result<&OrderRecord, PlaygroundError> {
        self.order_mut(order_id)?.cancel()?;
        self.release_closes(order_id)?;
        self.order_mut(order_id).map(|o| &*o)
    }

    fn expire_order(&mut self, order_id: &OrderId) -> Result<(), PlaygroundError> {
        self.order_mut(order_id)?.expire()?;
        self.release_closes(order_id)
    }

    /// Hand back the unfilled part of the volume a dead order claimed.
    fn release_closes(&mut self, order_id: &OrderId) -> Result<(), PlaygroundError> {
        let order = self.order_mut(order_id)?;
        let mut unfilled = order.remaining_quantity();
        let links: Vec<CloseLink> = order.closes().iter().rev().cloned().collect();

        for link in links {
            if unfilled <= Decimal::ZERO {
                break;
            }
            let released = self
                .order_mut(&link.order_id)?
                .release_closed_by(order_id, unfilled.min(link.quantity));
            unfilled -= released;
        }
        Ok(())
    }

    /// Claim open volume FIFO for a closing order.
    #[must_use]
    pub fn allocate_closes(
        &self,
        symbol: &Instrument,
        closing_side: OrderSide,
        quantity: Decimal,
    ) -> Vec<CloseLink> {
        let opening_side = match closing_side {
            OrderSide::Sell => OrderSide::Buy,
            OrderSide::BuyToCover => OrderSide::SellShort,
            OrderSide::Buy | OrderSide::SellShort => return Vec::new(),
        };

        let mut left = quantity;
        let mut links = Vec::new();
        for order in self
            .orders
            .iter()
            .filter(|o| o.symbol() == symbol && o.side() == opening_side)
        {
            if left <= Decimal::ZERO {
                break;
            }
            let available = order.remaining_open_quantity();
            if available <= Decimal::ZERO {
                continue;
            }
            let claimed = available.min(left);
            links.push(CloseLink::new(order.id().clone(), claimed));
            left -= claimed;
        }
        links
    }
}

fn equity_of(balance: Decimal, positions: &BTreeMap<Instrument, Position>) -> Decimal {
    balance + positions.values().map(Position::market_value).sum::<Decimal>()
}
