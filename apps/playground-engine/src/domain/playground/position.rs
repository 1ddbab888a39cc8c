//! Positions derived from the trade ledger.
//!
//! Positions are never stored. They are folded from trades in order, using
//! average cost: adding to a position blends the cost basis, reducing it
//! realizes PnL against the basis, and crossing zero closes first and opens
//! the remainder at the fill price.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::domain::order::Trade;
use crate::domain::shared::Instrument;

/// Maintenance requirement on long positions, as a share of cost.
pub const LONG_MAINTENANCE_RATE: Decimal = dec!(0.25);

/// Maintenance requirement on short positions, as a share of cost.
pub const SHORT_MAINTENANCE_RATE: Decimal = dec!(0.30);

/// Open quantity and average cost for one instrument.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Lot {
    /// Signed open quantity.
    pub quantity: Decimal,
    /// Average cost per unit of the open quantity.
    pub cost_basis: Decimal,
}

impl Lot {
    /// Apply a signed fill and return the PnL it realizes.
    pub fn apply(&mut self, quantity: Decimal, price: Decimal) -> Decimal {
        if quantity.is_zero() {
            return Decimal::ZERO;
        }

        let same_direction = self.quantity.is_zero()
            || self.quantity.is_sign_positive() == quantity.is_sign_positive();

        if same_direction {
            let held = self.quantity.abs();
            let added = quantity.abs();
            self.cost_basis = (held * self.cost_basis + added * price) / (held + added);
            self.quantity += quantity;
            return Decimal::ZERO;
        }

        let closed = self.quantity.abs().min(quantity.abs());
        let direction = if self.quantity.is_sign_positive() {
            Decimal::ONE
        } else {
            Decimal::NEGATIVE_ONE
        };
        let realized = (price - self.cost_basis) * closed * direction;

        let crosses = quantity.abs() > self.quantity.abs();
        self.quantity += quantity;
        if self.quantity.is_zero() {
            self.cost_basis = Decimal::ZERO;
        } else if crosses {
            self.cost_basis = price;
        }

        realized
    }
}

/// Fold a trade ledger into lots, one per instrument with a non-zero quantity.
#[must_use]
pub fn fold_lots<'a>(trades: impl IntoIterator<Item = &'a Trade>) -> BTreeMap<Instrument, Lot> {
    let mut lots: BTreeMap<Instrument, Lot> = BTreeMap::new();
    for trade in trades {
        lots.entry(trade.symbol().clone())
            .or_default()
            .apply(trade.quantity(), trade.price());
    }
    lots.retain(|_, lot| !lot.quantity.is_zero());
    lots
}

/// Maintenance requirement for a lot.
#[must_use]
pub fn maintenance_requirement(quantity: Decimal, cost_basis: Decimal) -> Decimal {
    let rate = if quantity.is_sign_negative() {
        SHORT_MAINTENANCE_RATE
    } else {
        LONG_MAINTENANCE_RATE
    };
    quantity.abs() * cost_basis * rate
}

/// A position as reported to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// Signed quantity.
    pub quantity: Decimal,
    /// Average cost per unit.
    pub cost_basis: Decimal,
    /// Price the position is marked at.
    pub mark_price: Decimal,
    /// `(mark - cost) * quantity`.
    pub unrealized_pnl: Decimal,
    /// Maintenance requirement.
    pub maintenance_margin: Decimal,
}

impl Position {
    /// Mark a lot. Without a mark price the cost basis is used.
    #[must_use]
    pub fn from_lot(lot: Lot, mark: Option<Decimal>) -> Self {
        let mark_price = mark.unwrap_or(lot.cost_basis);
        Self {
            quantity: lot.quantity,
            cost_basis: lot.cost_basis,
            mark_price,
            unrealized_pnl: (mark_price - lot.cost_basis) * lot.quantity,
            maintenance_margin: maintenance_requirement(lot.quantity, lot.cost_basis),
        }
    }

    /// Market value of the position.
    #[must_use]
    pub fn market_value(&self) -> Decimal {
        self.quantity * self.mark_price
    }

    /// Cost of the position, used to rank liquidations.
    #[must_use]
    pub fn exposure(&self) -> Decimal {
        self.quantity.abs() * self.cost_basis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::OrderId;
    use chrono::Utc;

    fn trade(quantity: Decimal, price: Decimal) -> Trade {
        Trade::new(
            OrderId::new("o"),
            Instrument::new("AAPL"),
            Utc::now(),
            quantity,
            price,
            Decimal::ZERO,
        )
    }

    #[test]
    fn blends_cost_when_adding() {
        let mut lot = Lot::default();
        assert_eq!(lot.apply(dec!(2), dec!(10)), Decimal::ZERO);
        assert_eq!(lot.apply(dec!(2), dec!(20)), Decimal::ZERO);
        assert_eq!(lot.quantity, dec!(4));
        assert_eq!(lot.cost_basis, dec!(15));
    }

    #[test]
    fn realizes_on_partial_close() {
        let mut lot = Lot::default();
        lot.apply(dec!(19), dec!(100));
        let realized = lot.apply(dec!(-9), dec!(110));
        assert_eq!(realized, dec!(90));
        assert_eq!(lot.quantity, dec!(10));
        assert_eq!(lot.cost_basis, dec!(100));
    }

    #[test]
    fn short_close_realizes_inverse() {
        let mut lot = Lot::default();
        lot.apply(dec!(-5), dec!(50));
        let realized = lot.apply(dec!(5), dec!(40));
        assert_eq!(realized, dec!(50));
        assert!(lot.quantity.is_zero());
        assert!(lot.cost_basis.is_zero());
    }

    #[test]
    fn crossing_zero_opens_remainder_at_fill() {
        let mut lot = Lot::default();
        lot.apply(dec!(19), dec!(100));
        let realized = lot.apply(dec!(-20), dec!(105));
        assert_eq!(realized, dec!(95));
        assert_eq!(lot.quantity, dec!(-1));
        assert_eq!(lot.cost_basis, dec!(105));
    }

    #[test]
    fn fold_drops_flat_instruments() {
        let trades = [trade(dec!(2), dec!(10)), trade(dec!(-2), dec!(12))];
        assert!(fold_lots(&trades).is_empty());

        let trades = [trade(dec!(2), dec!(10))];
        let lots = fold_lots(&trades);
        assert_eq!(lots[&Instrument::new("AAPL")].quantity, dec!(2));
    }

    #[test]
    fn maintenance_rates() {
        assert_eq!(maintenance_requirement(dec!(10), dec!(10)), dec!(25));
        assert_eq!(maintenance_requirement(dec!(-10), dec!(10)), dec!(30));
    }

    #[test]
    fn position_marks_to_price() {
        let lot = Lot {
            quantity: dec!(2),
            cost_basis: dec!(10),
        };
        let marked = Position::from_lot(lot, Some(dec!(20)));
        assert_eq!(marked.unrealized_pnl, dec!(20));
        assert_eq!(marked.market_value(), dec!(40));

        let unmarked = Position::from_lot(lot, None);
        assert_eq!(unmarked.unrealized_pnl, Decimal::ZERO);
        assert_eq!(unmarked.exposure(), dec!(20));
    }
}
