//! Fill application: the only path that moves balance.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Playground;
use crate::domain::order::{OrderClass, OrderError, OrderIntent, OrderRecord, Trade};
use crate::domain::playground::errors::PlaygroundError;
use crate::domain::shared::OrderId;

/// Broker-observed (or simulated) fill: time, price, absolute quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FillEntry {
    /// Fill time.
    pub time: DateTime<Utc>,
    /// Fill price.
    pub price: Decimal,
    /// Absolute fill quantity.
    pub quantity: Decimal,
}

/// What `commit_pending_order` did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FillOutcome {
    /// The order was filled (fully or partially).
    Filled(Trade),
    /// The order failed a fill-time check and was rejected.
    Rejected(OrderRecord),
}

impl FillOutcome {
    /// The trade, if the fill went through.
    #[must_use]
    pub const fn trade(&self) -> Option<&Trade> {
        match self {
            Self::Filled(trade) => Some(trade),
            Self::Rejected(_) => None,
        }
    }
}

impl Playground {
    /// Fill a working order.
    ///
    /// The fill is capped at the order's remaining quantity. With
    /// `perform_checks`, an order that fails a fill-time check is rejected and
    /// returned as [`FillOutcome::Rejected`] instead of erroring. An order that
    /// no longer accepts fills fails with [`PlaygroundError::TradingNotAllowed`].
    pub fn commit_pending_order(
        &mut self,
        order_id: &OrderId,
        fill: &FillEntry,
        perform_checks: bool,
    ) -> Result<FillOutcome, PlaygroundError> {
        let order = self.order_mut(order_id)?;
        if !order.status().is_trading_allowed() {
            return Err(PlaygroundError::TradingNotAllowed {
                order_id: order_id.clone(),
                status: order.status(),
            });
        }

        let quantity = fill.quantity.min(order.remaining_quantity());
        if quantity <= Decimal::ZERO {
            return Err(OrderError::ZeroFillQuantity.into());
        }
        if fill.price <= Decimal::ZERO {
            return Err(OrderError::NonPositiveFillPrice { price: fill.price }.into());
        }

        let order = order.clone();
        if perform_checks {
            if let Err(reason) = self.check_fill(&order, quantity, fill.price) {
                let rejected = self.reject_order(order_id, &reason)?.clone();
                return Ok(FillOutcome::Rejected(rejected));
            }
        }

        let signed = order.side().signed(quantity);
        let mut lot = self.lots().get(order.symbol()).copied().unwrap_or_default();
        let realized = lot.apply(signed, fill.price);

        let trade = Trade::new(
            order_id.clone(),
            order.symbol().clone(),
            fill.time,
            signed,
            fill.price,
            realized,
        );

        self.order_mut(order_id)?.fill(trade.clone())?;
        self.balance += trade.balance_delta();
        self.trades.push(trade.clone());

        Ok(FillOutcome::Filled(trade))
    }

    /// Record an order that already executed elsewhere: append it and fill
    /// it in full at `price` and `time`, without checks.
    ///
    /// Closing volume is allocated against earlier fills like any other
    /// closing order.
    pub fn backfill_order(
        &mut self,
        intent: OrderIntent,
        price: Decimal,
        time: DateTime<Utc>,
    ) -> Result<Trade, PlaygroundError> {
        intent.validate()?;
        let quantity = intent.quantity;
        let closes = self.allocate_closes(&intent.symbol, intent.side, quantity);
        let mut order = OrderRecord::from_intent(
            self.id.clone(),
            self.meta.live_account_type(),
            intent,
            time,
            price,
        );
        for close in closes {
            order.add_close(close);
        }

        let order_id = order.id().clone();
        self.append_order(order)?;

        let fill = FillEntry {
            time,
            price,
            quantity,
        };
        match self.commit_pending_order(&order_id, &fill, false)? {
            FillOutcome::Filled(trade) => Ok(trade),
            FillOutcome::Rejected(order) => Err(PlaygroundError::TradingNotAllowed {
                order_id,
                status: order.status(),
            }),
        }
    }

    /// Fill-time risk checks. Returns the rejection reason on failure.
    fn check_fill(&self, order: &OrderRecord, quantity: Decimal, price: Decimal) -> Result<(), String> {
        if order.class() != OrderClass::Equity {
            return Err("only equity orders are supported".to_string());
        }

        let position = self.position_quantity(order.symbol());
        let side = order.side();

        if !side.is_opening() {
            let (open, direction) = if side.is_buy() {
                (-position, "short")
            } else {
                (position, "long")
            };
            if quantity > open.max(Decimal::ZERO) {
                return Err(format!(
                    "order quantity {quantity} exceeds {direction} position of {}",
                    open.max(Decimal::ZERO)
                ));
            }
            return Ok(());
        }

        let conflicts = if side.is_buy() {
            position < Decimal::ZERO
        } else {
            position > Decimal::ZERO
        };
        if conflicts {
            return Err(format!("cannot {side} with position of {position}"));
        }

        let initial_margin = quantity * price;
        let free_margin = self.free_margin();
        if free_margin <= initial_margin {
            return Err(format!(
                "insufficient free margin: free_margin ({free_margin}) <= initial_margin ({initial_margin})"
            ));
        }

        Ok(())
    }
}
