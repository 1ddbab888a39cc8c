//! Order Record
//!
//! The persisted order: identity, intent, lifecycle state, and the links that
//! tie it to other orders (`closes`, `closed_by`, `reconciles`). Links are id
//! pairs, never references, so records can live in separate playgrounds.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::errors::OrderError;
use super::intent::OrderIntent;
use super::state_machine::OrderStateMachine;
use super::trade::Trade;
use super::value_objects::{OrderClass, OrderDuration, OrderSide, OrderStatus, OrderType};
use crate::domain::shared::{
    ExternalOrderId, Instrument, LiveAccountType, OrderId, OrderRef, PlaygroundId,
};

/// Directed close edge with the volume it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseLink {
    /// The other end of the edge.
    pub order_id: OrderId,
    /// Absolute volume covered by the edge.
    pub quantity: Decimal,
}

impl CloseLink {
    /// Create a close link.
    #[must_use]
    pub const fn new(order_id: OrderId, quantity: Decimal) -> Self {
        Self { order_id, quantity }
    }
}

/// An order and everything that has happened to it.
#[allow(clippy::struct_field_names)]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRecord {
    id: OrderId,
    external_id: Option<ExternalOrderId>,
    playground_id: PlaygroundId,
    account_type: LiveAccountType,
    class: OrderClass,
    side: OrderSide,
    symbol: Instrument,
    absolute_quantity: Decimal,
    order_type: OrderType,
    duration: OrderDuration,
    limit_price: Option<Decimal>,
    stop_price: Option<Decimal>,
    tag: String,
    status: OrderStatus,
    reject_reason: Option<String>,
    created_at: DateTime<Utc>,
    requested_price: Decimal,
    trades: Vec<Trade>,
    closes: Vec<CloseLink>,
    closed_by: Vec<CloseLink>,
    reconciles: Vec<OrderRef>,
}

impl OrderRecord {
    /// Create a `pending` order from an intent.
    #[must_use]
    pub fn from_intent(
        playground_id: PlaygroundId,
        account_type: LiveAccountType,
        intent: OrderIntent,
        created_at: DateTime<Utc>,
        requested_price: Decimal,
    ) -> Self {
        Self {
            id: OrderId::generate(),
            external_id: None,
            playground_id,
            account_type,
            class: intent.class,
            side: intent.side,
            symbol: intent.symbol,
            absolute_quantity: intent.quantity,
            order_type: intent.order_type,
            duration: intent.duration,
            limit_price: intent.limit_price,
            stop_price: intent.stop_price,
            tag: intent.tag,
            status: OrderStatus::Pending,
            reject_reason: None,
            created_at,
            requested_price,
            trades: Vec::new(),
            closes: Vec::new(),
            closed_by: Vec::new(),
            reconciles: Vec::new(),
        }
    }

    /// Copy this order into another playground as a fresh `pending` order
    /// with its own id, side, and quantity. Links and trades are not copied.
    #[must_use]
    pub fn mirror(
        &self,
        playground_id: PlaygroundId,
        account_type: LiveAccountType,
        side: OrderSide,
        absolute_quantity: Decimal,
    ) -> Self {
        Self {
            id: OrderId::generate(),
            external_id: None,
            playground_id,
            account_type,
            class: self.class,
            side,
            symbol: self.symbol.clone(),
            absolute_quantity,
            order_type: self.order_type,
            duration: self.duration,
            limit_price: self.limit_price,
            stop_price: self.stop_price,
            tag: self.tag.clone(),
            status: OrderStatus::Pending,
            reject_reason: None,
            created_at: self.created_at,
            requested_price: self.requested_price,
            trades: Vec::new(),
            closes: Vec::new(),
            closed_by: Vec::new(),
            reconciles: Vec::new(),
        }
    }

    // ========================================================================
    // Getters
    // ========================================================================

    /// Order id.
    #[must_use]
    pub const fn id(&self) -> &OrderId {
        &self.id
    }

    /// Arena address of this order.
    #[must_use]
    pub fn order_ref(&self) -> OrderRef {
        OrderRef::new(self.playground_id.clone(), self.id.clone())
    }

    /// Broker id, once routed.
    #[must_use]
    pub const fn external_id(&self) -> Option<&ExternalOrderId> {
        self.external_id.as_ref()
    }

    /// Owning playground.
    #[must_use]
    pub const fn playground_id(&self) -> &PlaygroundId {
        &self.playground_id
    }

    /// Account the order is booked against.
    #[must_use]
    pub const fn account_type(&self) -> LiveAccountType {
        self.account_type
    }

    /// Asset class.
    #[must_use]
    pub const fn class(&self) -> OrderClass {
        self.class
    }

    /// Side.
    #[must_use]
    pub const fn side(&self) -> OrderSide {
        self.side
    }

    /// Instrument.
    #[must_use]
    pub const fn symbol(&self) -> &Instrument {
        &self.symbol
    }

    /// Unsigned quantity.
    #[must_use]
    pub const fn absolute_quantity(&self) -> Decimal {
        self.absolute_quantity
    }

    /// Quantity signed by side.
    #[must_use]
    pub fn signed_quantity(&self) -> Decimal {
        self.side.signed(self.absolute_quantity)
    }

    /// Order type.
    #[must_use]
    pub const fn order_type(&self) -> OrderType {
        self.order_type
    }

    /// Time in force.
    #[must_use]
    pub const fn duration(&self) -> OrderDuration {
        self.duration
    }

    /// Limit price.
    #[must_use]
    pub const fn limit_price(&self) -> Option<Decimal> {
        self.limit_price
    }

    /// Stop price.
    #[must_use]
    pub const fn stop_price(&self) -> Option<Decimal> {
        self.stop_price
    }

    /// Tag.
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> OrderStatus {
        self.status
    }

    /// Reject reason, if rejected.
    #[must_use]
    pub fn reject_reason(&self) -> Option<&str> {
        self.reject_reason.as_deref()
    }

    /// Placement time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Price observed at placement.
    #[must_use]
    pub const fn requested_price(&self) -> Decimal {
        self.requested_price
    }

    /// Fills.
    #[must_use]
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Orders this one closes.
    #[must_use]
    pub fn closes(&self) -> &[CloseLink] {
        &self.closes
    }

    /// Orders that close this one.
    #[must_use]
    pub fn closed_by(&self) -> &[CloseLink] {
        &self.closed_by
    }

    /// Orders in other playgrounds mirrored by (or mirroring) this one.
    #[must_use]
    pub fn reconciles(&self) -> &[OrderRef] {
        &self.reconciles
    }

    /// Absolute filled volume.
    #[must_use]
    pub fn filled_quantity(&self) -> Decimal {
        self.trades.iter().map(|t| t.quantity().abs()).sum()
    }

    /// Absolute volume still to fill.
    #[must_use]
    pub fn remaining_quantity(&self) -> Decimal {
        self.absolute_quantity - self.filled_quantity()
    }

    /// Filled opening volume not yet claimed by a closing order.
    #[must_use]
    pub fn remaining_open_quantity(&self) -> Decimal {
        let claimed: Decimal = self.closed_by.iter().map(|c| c.quantity).sum();
        (self.filled_quantity() - claimed).max(Decimal::ZERO)
    }

    /// Volume-weighted average fill price.
    #[must_use]
    pub fn average_fill_price(&self) -> Option<Decimal> {
        let filled = self.filled_quantity();
        if filled.is_zero() {
            return None;
        }
        let notional: Decimal = self
            .trades
            .iter()
            .map(|t| t.quantity().abs() * t.price())
            .sum();
        Some(notional / filled)
    }

    // ========================================================================
    // State Transitions
    // ========================================================================

    /// `pending -> open`.
    pub fn accept(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Open)
    }

    /// Reject with a reason.
    pub fn reject(&mut self, reason: impl Into<String>) -> Result<(), OrderError> {
        self.transition(OrderStatus::Rejected)?;
        self.reject_reason = Some(reason.into());
        Ok(())
    }

    /// Cancel.
    pub fn cancel(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Canceled)
    }

    /// Expire at end of session.
    pub fn expire(&mut self) -> Result<(), OrderError> {
        self.transition(OrderStatus::Expired)
    }

    /// Apply a fill.
    ///
    /// A `pending` order is accepted first. The order becomes `filled` when no
    /// volume remains, `partially_filled` otherwise.
    pub fn fill(&mut self, trade: Trade) -> Result<(), OrderError> {
        if self.status.is_terminal() {
            return Err(OrderError::NotOpenOrPending {
                order_id: self.id.clone(),
                status: self.status,
            });
        }

        if trade.quantity().is_zero() {
            return Err(OrderError::ZeroFillQuantity);
        }

        if trade.price() <= Decimal::ZERO {
            return Err(OrderError::NonPositiveFillPrice {
                price: trade.price(),
            });
        }

        let remaining = self.remaining_quantity();
        if remaining.is_zero() {
            return Err(OrderError::AlreadyFilled {
                order_id: self.id.clone(),
            });
        }

        let fill_quantity = trade.quantity().abs();
        if fill_quantity > remaining {
            return Err(OrderError::FillExceedsRemaining {
                order_id: self.id.clone(),
                fill_quantity,
                remaining,
            });
        }

        if self.status == OrderStatus::Pending {
            self.accept()?;
        }

        let next = if fill_quantity == remaining {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.transition(next)?;
        self.trades.push(trade);
        Ok(())
    }

    fn transition(&mut self, to: OrderStatus) -> Result<(), OrderError> {
        OrderStateMachine::validate_transition(&self.id, self.status, to)?;
        self.status = to;
        Ok(())
    }

    // ========================================================================
    // Links
    // ========================================================================

    /// Record the broker id assigned on routing.
    pub fn set_external_id(&mut self, external_id: ExternalOrderId) {
        self.external_id = Some(external_id);
    }

    /// Link to an order in another playground.
    pub fn add_reconcile(&mut self, target: OrderRef) {
        if !self.reconciles.contains(&target) {
            self.reconciles.push(target);
        }
    }

    /// Record that this order closes `quantity` of another order.
    pub fn add_close(&mut self, link: CloseLink) {
        self.closes.push(link);
    }

    /// Record that `quantity` of this order is closed by another order.
    pub fn add_closed_by(&mut self, link: CloseLink) {
        self.closed_by.push(link);
    }

    /// Give back up to `quantity` of the volume claimed by `closer`.
    /// Returns the volume released.
    pub fn release_closed_by(&mut self, closer: &OrderId, quantity: Decimal) -> Decimal {
        let mut left = quantity;
        for link in self.closed_by.iter_mut().filter(|l| &l.order_id == closer) {
            let released = link.quantity.min(left);
            link.quantity -= released;
            left -= released;
        }
        self.closed_by.retain(|l| !l.quantity.is_zero());
        quantity - left
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 14, 31, 0).unwrap()
    }

    fn buy(quantity: Decimal) -> OrderRecord {
        OrderRecord::from_intent(
            PlaygroundId::new("pg-1"),
            LiveAccountType::Simulator,
            OrderIntent::market("AAPL", OrderSide::Buy, quantity),
            at(),
            dec!(10),
        )
    }

    fn fill_of(order: &OrderRecord, quantity: Decimal, price: Decimal) -> Trade {
        Trade::new(
            order.id().clone(),
            order.symbol().clone(),
            at(),
            quantity,
            price,
            Decimal::ZERO,
        )
    }

    #[test]
    fn new_order_is_pending() {
        let order = buy(dec!(2));
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.signed_quantity(), dec!(2));
        assert_eq!(order.remaining_quantity(), dec!(2));
        assert!(order.external_id().is_none());
    }

    #[test]
    fn full_fill_from_pending() {
        let mut order = buy(dec!(2));
        let trade = fill_of(&order, dec!(2), dec!(10));
        order.fill(trade).unwrap();

        assert_eq!(order.status(), OrderStatus::Filled);
        assert_eq!(order.trades().len(), 1);
        assert_eq!(order.average_fill_price(), Some(dec!(10)));
        assert_eq!(order.remaining_open_quantity(), dec!(2));
    }

    #[test]
    fn partial_then_full_fill() {
        let mut order = buy(dec!(5));
        order.accept().unwrap();

        let first = fill_of(&order, dec!(2), dec!(10));
        order.fill(first).unwrap();
        assert_eq!(order.status(), OrderStatus::PartiallyFilled);

        let second = fill_of(&order, dec!(3), dec!(12));
        order.fill(second).unwrap();
        assert_eq!(order.status(), OrderStatus::Filled);
        assert_eq!(order.average_fill_price(), Some(dec!(11.2)));
    }

    #[test]
    fn overfill_is_rejected() {
        let mut order = buy(dec!(2));
        let trade = fill_of(&order, dec!(3), dec!(10));
        assert!(matches!(
            order.fill(trade),
            Err(OrderError::FillExceedsRemaining { .. })
        ));
        assert_eq!(order.status(), OrderStatus::Pending);
    }

    #[test]
    fn terminal_orders_stay_terminal() {
        let mut order = buy(dec!(2));
        order.reject("insufficient buying power").unwrap();
        assert_eq!(order.reject_reason(), Some("insufficient buying power"));

        assert!(matches!(
            order.accept(),
            Err(OrderError::NotOpenOrPending { .. })
        ));
        assert!(matches!(order.cancel(), Err(OrderError::NotOpenOrPending { .. })));
        let trade = fill_of(&order, dec!(2), dec!(10));
        assert!(matches!(
            order.fill(trade),
            Err(OrderError::NotOpenOrPending { .. })
        ));
    }

    #[test]
    fn pending_cannot_expire() {
        let mut order = buy(dec!(2));
        assert!(matches!(
            order.expire(),
            Err(OrderError::InvalidStateTransition { .. })
        ));
        order.accept().unwrap();
        order.expire().unwrap();
        assert_eq!(order.status(), OrderStatus::Expired);
    }

    #[test]
    fn mirror_gets_fresh_identity() {
        let live = buy(dec!(19));
        let copy = live.mirror(
            PlaygroundId::new("reconcile"),
            LiveAccountType::Reconciliation,
            OrderSide::Buy,
            dec!(19),
        );
        assert_ne!(copy.id(), live.id());
        assert_eq!(copy.playground_id().as_str(), "reconcile");
        assert_eq!(copy.side(), live.side());
        assert_eq!(copy.absolute_quantity(), dec!(19));
        assert!(copy.reconciles().is_empty());
    }

    #[test]
    fn closed_by_reduces_open_volume() {
        let mut order = buy(dec!(19));
        let trade = fill_of(&order, dec!(19), dec!(100));
        order.fill(trade).unwrap();
        order.add_closed_by(CloseLink::new(OrderId::new("closer"), dec!(19)));
        assert_eq!(order.remaining_open_quantity(), Decimal::ZERO);
    }

    #[test]
    fn reconcile_links_are_deduplicated() {
        let mut order = buy(dec!(1));
        let target = OrderRef::new(PlaygroundId::new("r"), OrderId::new("o"));
        order.add_reconcile(target.clone());
        order.add_reconcile(target);
        assert_eq!(order.reconciles().len(), 1);
    }
}
