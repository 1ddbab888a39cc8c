//! Order placement. Placement only builds a [`ChangeSet`]; nothing is
//! mutated until the caller applies it.

use rust_decimal::Decimal;

use super::Playground;
use crate::domain::order::{CloseLink, OrderClass, OrderError, OrderIntent, OrderRecord, OrderSide};
use crate::domain::playground::change::{Change, ChangeSet};
use crate::domain::playground::errors::PlaygroundError;
use crate::domain::playground::meta::Environment;
use crate::domain::playground::mirror::{self, RECONCILE_CLOSE_TAG};
use crate::domain::shared::{LiveAccountType, OrderRef};

impl Playground {
    /// Place an order in a simulator or reconcile playground.
    ///
    /// Simulator orders are priced from the candle feeds; reconcile orders use
    /// `quote` when given. Live playgrounds must use [`Self::place_live_order`].
    pub fn place_order(
        &self,
        intent: OrderIntent,
        perform_checks: bool,
        quote: Option<Decimal>,
    ) -> Result<ChangeSet, PlaygroundError> {
        intent.validate()?;
        let price = match self.environment() {
            Environment::Simulator => self.current_price(&intent.symbol),
            Environment::Reconcile => quote.or_else(|| self.current_price(&intent.symbol)),
            Environment::Live => {
                return Err(PlaygroundError::MissingReconcileLink(self.id().clone()));
            }
        }
        .ok_or_else(|| PlaygroundError::NoPrice {
            symbol: intent.symbol.clone(),
        })?;

        let order = self.prepare_order(intent, perform_checks, price)?;

        let mut changes = ChangeSet::new();
        changes.push(Change::AppendOrder(order));
        Ok(changes)
    }

    /// Place an order in a live playground and mirror it into `reconcile`.
    ///
    /// Produces three changes: the live order, the reconcile orders (plus any
    /// closing orders for peer live playgrounds), and the reconcile links.
    pub fn place_live_order(
        &self,
        reconcile: &Playground,
        intent: OrderIntent,
        perform_checks: bool,
        quote: Decimal,
    ) -> Result<ChangeSet, PlaygroundError> {
        if self.environment() != Environment::Live {
            return Err(PlaygroundError::Unsupported {
                environment: self.environment(),
                operation: "live placement",
            });
        }
        if self.meta().reconcile_playground_id.as_ref() != Some(reconcile.id()) {
            return Err(PlaygroundError::MissingReconcileLink(self.id().clone()));
        }
        intent.validate()?;
        if quote <= Decimal::ZERO {
            return Err(PlaygroundError::NoPrice {
                symbol: intent.symbol.clone(),
            });
        }

        let live_order = self.prepare_order(intent, perform_checks, quote)?;
        let live_ref = live_order.order_ref();

        let plan = mirror::plan(
            reconcile,
            live_order.symbol(),
            live_order.side(),
            live_order.absolute_quantity(),
        );

        let mut reconcile_orders = Vec::with_capacity(plan.legs.len());
        let mut peer_closes = Vec::new();
        let mut links = Vec::new();

        for leg in plan.legs {
            let mut reconcile_order = live_order.mirror(
                reconcile.id().clone(),
                LiveAccountType::Reconciliation,
                leg.side,
                leg.quantity,
            );
            for close in leg.closes {
                reconcile_order.add_close(close);
            }
            let reconcile_ref = reconcile_order.order_ref();
            links.push((live_ref.clone(), reconcile_ref.clone()));

            for (target, quantity) in leg.live_closes {
                if &target.playground_id == self.id() {
                    continue;
                }
                let peer = self.peer_close(&live_order, &target, leg.side, quantity);
                links.push((peer.order_ref(), reconcile_ref.clone()));
                peer_closes.push(peer);
            }

            reconcile_orders.push(reconcile_order);
        }

        let mut changes = ChangeSet::new();
        changes.push(Change::AppendOrder(live_order));
        changes.push(Change::Mirror {
            reconcile_playground_id: reconcile.id().clone(),
            orders: reconcile_orders,
            peer_closes,
        });
        changes.push(Change::LinkReconciles(links));
        Ok(changes)
    }

    /// Closing order for a live order held in another live playground.
    fn peer_close(
        &self,
        placed: &OrderRecord,
        target: &OrderRef,
        side: OrderSide,
        quantity: Decimal,
    ) -> OrderRecord {
        let intent = OrderIntent::market(placed.symbol().clone(), side, quantity)
            .with_tag(RECONCILE_CLOSE_TAG);
        let mut order = OrderRecord::from_intent(
            target.playground_id.clone(),
            self.meta().live_account_type(),
            intent,
            placed.created_at(),
            placed.requested_price(),
        );
        order.add_close(CloseLink::new(target.order_id.clone(), quantity));
        order
    }

    /// Placement checks shared by every environment, then the pending record.
    fn prepare_order(
        &self,
        intent: OrderIntent,
        perform_checks: bool,
        price: Decimal,
    ) -> Result<OrderRecord, PlaygroundError> {
        if intent.class != OrderClass::Equity {
            return Err(OrderError::UnsupportedClass {
                class: intent.class,
            }
            .into());
        }

        if perform_checks {
            self.check_side(&intent)?;
            if intent.side.is_opening() {
                let required = intent.quantity * price;
                let free_margin = self.free_margin();
                if required > free_margin {
                    return Err(PlaygroundError::InsufficientFreeMargin {
                        required,
                        free_margin,
                    });
                }
            }
        }

        let closes = self.allocate_closes(&intent.symbol, intent.side, intent.quantity);
        let mut order = OrderRecord::from_intent(
            self.id().clone(),
            self.meta().live_account_type(),
            intent,
            self.current_time(),
            price,
        );
        for close in closes {
            order.add_close(close);
        }
        Ok(order)
    }

    /// A long disallows opening a short, a short disallows opening a long,
    /// and a flat position has nothing to close. Working orders count.
    fn check_side(&self, intent: &OrderIntent) -> Result<(), PlaygroundError> {
        let position =
            self.position_quantity(&intent.symbol) + self.pending_quantity(&intent.symbol);

        let allowed = match intent.side {
            OrderSide::Buy | OrderSide::Sell => position >= Decimal::ZERO,
            OrderSide::BuyToCover | OrderSide::SellShort => position <= Decimal::ZERO,
        } && !(position.is_zero() && !intent.side.is_opening());

        if allowed {
            Ok(())
        } else {
            Err(PlaygroundError::SideNotAllowed {
                symbol: intent.symbol.clone(),
                side: intent.side,
                position,
            })
        }
    }
}
