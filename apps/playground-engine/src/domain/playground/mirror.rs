//! Mirroring live orders into the reconcile playground.
//!
//! A live order becomes one or two reconcile orders depending on the
//! reconcile position it meets:
//!
//! ```text
//! position × order < 0   close min(|position|, qty), then open the remainder
//! otherwise              one opening copy (sell → sell_short, buy_to_cover → buy)
//! ```
//!
//! The close leg claims open reconcile orders FIFO. When a claimed order
//! mirrors a live order in a different live playground, that playground gets
//! a closing order of its own so both sides keep seeing the same fills.

use rust_decimal::Decimal;

use super::aggregate::Playground;
use crate::domain::order::{CloseLink, OrderSide};
use crate::domain::shared::{Instrument, OrderRef, PlaygroundId};

/// Tag carried by closing orders synthesized in peer live playgrounds.
pub const RECONCILE_CLOSE_TAG: &str = "reconcile-close";

/// One reconcile order to create.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLeg {
    /// Side of the reconcile order.
    pub side: OrderSide,
    /// Absolute quantity.
    pub quantity: Decimal,
    /// Reconcile orders this leg closes.
    pub closes: Vec<CloseLink>,
    /// Live orders flattened by this leg, keyed by the reconcile order closed.
    pub live_closes: Vec<(OrderRef, Decimal)>,
}

/// Reconcile legs for one live order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPlan {
    /// Legs, close leg first.
    pub legs: Vec<MirrorLeg>,
}

impl MirrorPlan {
    /// Live playgrounds, other than `placing`, that receive a peer close.
    #[must_use]
    pub fn peer_playgrounds(&self, placing: &PlaygroundId) -> Vec<PlaygroundId> {
        let mut ids: Vec<PlaygroundId> = self
            .legs
            .iter()
            .flat_map(|leg| leg.live_closes.iter())
            .map(|(target, _)| target.playground_id.clone())
            .filter(|id| id != placing)
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Sum of signed leg quantities.
    #[must_use]
    pub fn signed_total(&self) -> Decimal {
        self.legs.iter().map(|l| l.side.signed(l.quantity)).sum()
    }
}

/// Split a live order against a reconcile position.
///
/// Returns `(side, quantity)` legs; the close leg, when present, comes first.
#[must_use]
pub fn split(position: Decimal, side: OrderSide, quantity: Decimal) -> Vec<(OrderSide, Decimal)> {
    let signed = side.signed(quantity);

    if position * signed < Decimal::ZERO {
        let closed = position.abs().min(quantity);
        let opened = quantity - closed;
        let (close_side, open_side) = if position > Decimal::ZERO {
            (OrderSide::Sell, OrderSide::SellShort)
        } else {
            (OrderSide::BuyToCover, OrderSide::Buy)
        };

        let mut legs = vec![(close_side, closed)];
        if opened > Decimal::ZERO {
            legs.push((open_side, opened));
        }
        return legs;
    }

    let opening = match side {
        OrderSide::Sell => OrderSide::SellShort,
        OrderSide::BuyToCover => OrderSide::Buy,
        other => other,
    };
    vec![(opening, quantity)]
}

/// Plan the reconcile orders for a live order on `symbol`.
#[must_use]
pub fn plan(
    reconcile: &Playground,
    symbol: &Instrument,
    side: OrderSide,
    quantity: Decimal,
) -> MirrorPlan {
    let position = reconcile.position_quantity(symbol);
    let legs = split(position, side, quantity)
        .into_iter()
        .map(|(leg_side, leg_quantity)| {
            if leg_side.is_opening() {
                return MirrorLeg {
                    side: leg_side,
                    quantity: leg_quantity,
                    closes: Vec::new(),
                    live_closes: Vec::new(),
                };
            }

            let closes = reconcile.allocate_closes(symbol, leg_side, leg_quantity);
            let live_closes = closes
                .iter()
                .flat_map(|link| {
                    reconcile
                        .order(&link.order_id)
                        .map(|closed| closed.reconciles().to_vec())
                        .unwrap_or_default()
                        .into_iter()
                        .map(move |live| (live, link.quantity))
                })
                .collect();

            MirrorLeg {
                side: leg_side,
                quantity: leg_quantity,
                closes,
                live_closes,
            }
        })
        .collect();

    MirrorPlan { legs }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test]
    fn long_crossed_by_sell_short_splits() {
        let legs = split(dec!(19), OrderSide::SellShort, dec!(20));
        assert_eq!(
            legs,
            vec![(OrderSide::Sell, dec!(19)), (OrderSide::SellShort, dec!(1))]
        );
    }

    #[test]
    fn short_crossed_by_buy_splits() {
        let legs = split(dec!(-3), OrderSide::Buy, dec!(5));
        assert_eq!(
            legs,
            vec![(OrderSide::BuyToCover, dec!(3)), (OrderSide::Buy, dec!(2))]
        );
    }

    #[test]
    fn exact_close_has_one_leg() {
        let legs = split(dec!(19), OrderSide::Sell, dec!(19));
        assert_eq!(legs, vec![(OrderSide::Sell, dec!(19))]);
    }

    #[test_case(dec!(0), OrderSide::Buy => vec![(OrderSide::Buy, dec!(19))]; "flat buy")]
    #[test_case(dec!(0), OrderSide::Sell => vec![(OrderSide::SellShort, dec!(19))]; "flat sell opens short")]
    #[test_case(dec!(0), OrderSide::BuyToCover => vec![(OrderSide::Buy, dec!(19))]; "flat cover opens long")]
    #[test_case(dec!(5), OrderSide::Buy => vec![(OrderSide::Buy, dec!(19))]; "long extends")]
    #[test_case(dec!(-5), OrderSide::SellShort => vec![(OrderSide::SellShort, dec!(19))]; "short extends")]
    fn same_direction_single_copy(position: Decimal, side: OrderSide) -> Vec<(OrderSide, Decimal)> {
        split(position, side, dec!(19))
    }

    fn side_strategy() -> impl Strategy<Value = OrderSide> {
        prop_oneof![
            Just(OrderSide::Buy),
            Just(OrderSide::Sell),
            Just(OrderSide::BuyToCover),
            Just(OrderSide::SellShort),
        ]
    }

    proptest! {
        #[test]
        fn legs_preserve_signed_quantity(
            position in -1_000i64..1_000,
            side in side_strategy(),
            quantity in 1i64..1_000,
        ) {
            let position = Decimal::from(position);
            let quantity = Decimal::from(quantity);
            let legs = split(position, side, quantity);

            prop_assert!(!legs.is_empty() && legs.len() <= 2);

            let total: Decimal = legs.iter().map(|(s, q)| s.signed(*q)).sum();
            prop_assert_eq!(total, side.signed(quantity));

            for (leg_side, leg_quantity) in &legs {
                prop_assert!(*leg_quantity > Decimal::ZERO);
                if !leg_side.is_opening() {
                    prop_assert!(*leg_quantity <= position.abs());
                }
            }
        }
    }
}
