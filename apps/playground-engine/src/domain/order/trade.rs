//! Trade: an immutable fill.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::shared::{Instrument, OrderId, TradeId};

/// An immutable fill against an order.
///
/// `quantity` is signed (positive buys, negative sells). `balance_delta` is
/// the cash movement the fill caused (`-price * quantity`); `realized_pnl` is
/// the profit booked against the cost basis of the position it closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    id: TradeId,
    order_id: OrderId,
    symbol: Instrument,
    created_at: DateTime<Utc>,
    quantity: Decimal,
    price: Decimal,
    balance_delta: Decimal,
    realized_pnl: Decimal,
}

impl Trade {
    /// Create a trade with a fresh id.
    #[must_use]
    pub fn new(
        order_id: OrderId,
        symbol: Instrument,
        created_at: DateTime<Utc>,
        quantity: Decimal,
        price: Decimal,
        realized_pnl: Decimal,
    ) -> Self {
        Self {
            id: TradeId::generate(),
            order_id,
            symbol,
            created_at,
            quantity,
            price,
            balance_delta: -(price * quantity),
            realized_pnl,
        }
    }

    /// Trade id.
    #[must_use]
    pub const fn id(&self) -> &TradeId {
        &self.id
    }

    /// Order the trade filled.
    #[must_use]
    pub const fn order_id(&self) -> &OrderId {
        &self.order_id
    }

    /// Instrument.
    #[must_use]
    pub const fn symbol(&self) -> &Instrument {
        &self.symbol
    }

    /// Fill time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Signed quantity.
    #[must_use]
    pub const fn quantity(&self) -> Decimal {
        self.quantity
    }

    /// Fill price.
    #[must_use]
    pub const fn price(&self) -> Decimal {
        self.price
    }

    /// Cash movement caused by the fill.
    #[must_use]
    pub const fn balance_delta(&self) -> Decimal {
        self.balance_delta
    }

    /// Realized profit or loss booked by the fill.
    #[must_use]
    pub const fn realized_pnl(&self) -> Decimal {
        self.realized_pnl
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    #[test]
    fn buy_moves_cash_out() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 14, 31, 0).unwrap();
        let trade = Trade::new(
            OrderId::new("o-1"),
            Instrument::new("AAPL"),
            at,
            dec!(2),
            dec!(10),
            Decimal::ZERO,
        );
        assert_eq!(trade.balance_delta(), dec!(-20));
        assert_eq!(trade.quantity(), dec!(2));
        assert_eq!(trade.created_at(), at);
    }

    #[test]
    fn sell_moves_cash_in() {
        let trade = Trade::new(
            OrderId::new("o-2"),
            Instrument::new("AAPL"),
            Utc::now(),
            dec!(-19),
            dec!(105),
            dec!(95),
        );
        assert_eq!(trade.balance_delta(), dec!(1995));
        assert_eq!(trade.realized_pnl(), dec!(95));
    }
}
