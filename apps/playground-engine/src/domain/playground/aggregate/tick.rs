//! Tick: advance a playground and report what changed.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use super::{FillEntry, FillOutcome, Playground};
use crate::domain::market::{Clock, ClockAdvance};
use crate::domain::order::{
    OrderDuration, OrderIntent, OrderRecord, OrderSide, OrderStatus, OrderType, Trade,
};
use crate::domain::playground::errors::PlaygroundError;
use crate::domain::playground::meta::Environment;
use crate::domain::playground::tick_delta::{EquityPoint, TickDelta, TickEvent};

impl Playground {
    /// Advance the playground by `duration`.
    ///
    /// With `is_preview`, the tick runs on a detached copy and the playground
    /// is left untouched. Reconcile playgrounds do not tick; live playgrounds
    /// cannot preview.
    pub fn tick(&mut self, duration: Duration, is_preview: bool) -> Result<TickDelta, PlaygroundError> {
        let capabilities = self.environment().capabilities();
        if !capabilities.ticks {
            return Err(PlaygroundError::Unsupported {
                environment: self.environment(),
                operation: "tick",
            });
        }
        if is_preview && !capabilities.previews {
            return Err(PlaygroundError::Unsupported {
                environment: self.environment(),
                operation: "preview",
            });
        }

        match (self.environment(), is_preview) {
            (Environment::Live, _) => self.live_tick(),
            (_, true) => self.detached_copy().simulate(duration),
            (_, false) => self.simulate(duration),
        }
    }

    /// Simulator ticks are all-or-nothing: a failure restores the state the
    /// tick started from.
    fn simulate(&mut self, duration: Duration) -> Result<TickDelta, PlaygroundError> {
        let advance = self.clock.peek(duration)?;
        let checkpoint = Checkpoint::take(self);

        let result = self.step(&advance);
        if result.is_err() {
            checkpoint.restore(self);
        }
        result
    }

    fn step(&mut self, advance: &ClockAdvance) -> Result<TickDelta, PlaygroundError> {
        let perform_checks = self.environment().capabilities().perform_checks;
        let started_at = self.current_time();

        let (mut new_trades, mut invalid_orders) = self.fill_working_orders(started_at, perform_checks)?;

        let mut events = Vec::new();
        if perform_checks {
            if let Some((event, trades)) = self.liquidate(started_at)? {
                new_trades.extend(trades);
                events.push(event);
            }
        }

        self.clock.apply(advance);
        if advance.session_boundary {
            invalid_orders.extend(self.expire_day_orders()?);
        }

        let now = advance.current_time;
        let mut new_candles = Vec::new();
        for repository in &mut self.repositories {
            let crossed = repository.advance(now);
            new_candles.extend(crossed.into_iter().map(|bar| repository.event(bar)));
        }
        new_trades.extend(self.new_trades.drain());

        let point = EquityPoint {
            timestamp: now,
            equity: self.equity(),
        };
        self.equity_plot.push(point);

        Ok(TickDelta {
            new_trades,
            new_candles,
            invalid_orders,
            events,
            current_time: now,
            is_backtest_complete: advance.is_backtest_complete,
            equity_plot: vec![point],
        })
    }

    /// Live ticks report what the feeds and the reconciler queued since the
    /// last tick. The clock follows wall time through [`Self::sync_clock`].
    fn live_tick(&mut self) -> Result<TickDelta, PlaygroundError> {
        let new_candles = self.new_candles.drain();
        for event in &new_candles {
            if let Some(repository) = self
                .repositories
                .iter_mut()
                .find(|r| r.symbol() == &event.symbol && r.period() == event.period)
            {
                let is_new = repository
                    .current_candle()
                    .is_none_or(|last| last.timestamp < event.bar.timestamp);
                if is_new {
                    repository.append_bars(vec![event.bar.clone()], None)?;
                }
            }
        }

        let new_trades = self.new_trades.drain();
        let now = self.current_time();
        let point = EquityPoint {
            timestamp: now,
            equity: self.equity(),
        };
        self.equity_plot.push(point);

        Ok(TickDelta {
            new_trades,
            new_candles,
            invalid_orders: Vec::new(),
            events: Vec::new(),
            current_time: now,
            is_backtest_complete: false,
            equity_plot: vec![point],
        })
    }

    /// Accept pending orders, then fill every working order whose condition
    /// holds at the price observable now.
    fn fill_working_orders(
        &mut self,
        now: DateTime<Utc>,
        perform_checks: bool,
    ) -> Result<(Vec<Trade>, Vec<OrderRecord>), PlaygroundError> {
        let mut trades = Vec::new();
        let mut invalid = Vec::new();

        let working: Vec<_> = self
            .orders
            .iter()
            .filter(|o| o.status().is_trading_allowed())
            .map(|o| o.id().clone())
            .collect();

        for order_id in working {
            if self.order(&order_id).is_some_and(|o| o.status() == OrderStatus::Pending) {
                self.accept_order(&order_id)?;
            }

            let Some(order) = self.order(&order_id) else {
                continue;
            };
            let Some(price) = self.current_price(order.symbol()) else {
                continue;
            };
            let Some(fill_price) = trigger_price(order, price) else {
                continue;
            };

            let fill = FillEntry {
                time: now,
                price: fill_price,
                quantity: order.remaining_quantity(),
            };
            match self.commit_pending_order(&order_id, &fill, perform_checks)? {
                FillOutcome::Filled(trade) => trades.push(trade),
                FillOutcome::Rejected(order) => invalid.push(order),
            }
        }

        Ok((trades, invalid))
    }

    /// While equity is below the maintenance requirement, close the largest
    /// position at its mark.
    fn liquidate(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<Option<(TickEvent, Vec<Trade>)>, PlaygroundError> {
        let starting_equity = self.equity();
        let starting_maintenance = self.maintenance_margin();
        let mut placed = Vec::new();
        let mut trades = Vec::new();

        for _ in 0..self.positions().len() {
            let positions = self.positions();
            let equity = self.equity();
            let maintenance = self.maintenance_margin();
            if equity >= maintenance {
                break;
            }

            let Some((symbol, position)) = positions
                .into_iter()
                .max_by(|(_, a), (_, b)| a.exposure().cmp(&b.exposure()))
            else {
                break;
            };

            let side = if position.quantity > Decimal::ZERO {
                OrderSide::Sell
            } else {
                OrderSide::BuyToCover
            };
            let quantity = position.quantity.abs();
            let tag = format!(
                "liquidation - equity of {equity:.2} < {maintenance:.2} (maintenance margin)"
            );
            let intent = OrderIntent::market(symbol.clone(), side, quantity).with_tag(tag);

            let mut order = OrderRecord::from_intent(
                self.id.clone(),
                self.meta.live_account_type(),
                intent,
                now,
                position.mark_price,
            );
            for close in self.allocate_closes(&symbol, side, quantity) {
                order.add_close(close);
            }
            let order_id = order.id().clone();
            self.append_order(order)?;

            let fill = FillEntry {
                time: now,
                price: position.mark_price,
                quantity,
            };
            if let FillOutcome::Filled(trade) = self.commit_pending_order(&order_id, &fill, false)? {
                trades.push(trade);
            }
            if let Some(order) = self.order(&order_id) {
                placed.push(order.clone());
            }
        }

        if placed.is_empty() {
            return Ok(None);
        }

        Ok(Some((
            TickEvent::Liquidation {
                equity: starting_equity,
                maintenance_margin: starting_maintenance,
                orders_placed: placed,
            },
            trades,
        )))
    }

    /// Expire working day orders at a session boundary.
    fn expire_day_orders(&mut self) -> Result<Vec<OrderRecord>, PlaygroundError> {
        let expiring: Vec<_> = self
            .orders
            .iter()
            .filter(|o| {
                o.duration() == OrderDuration::Day
                    && matches!(o.status(), OrderStatus::Open | OrderStatus::PartiallyFilled)
            })
            .map(|o| o.id().clone())
            .collect();

        let mut expired = Vec::with_capacity(expiring.len());
        for order_id in expiring {
            self.expire_order(&order_id)?;
            if let Some(order) = self.order(&order_id) {
                expired.push(order.clone());
            }
        }
        Ok(expired)
    }
}

/// State a simulator tick can change before it fails. Repository cursors
/// move only after the last fallible step.
struct Checkpoint {
    clock: Clock,
    balance: Decimal,
    orders: Vec<OrderRecord>,
    trades: Vec<Trade>,
}

impl Checkpoint {
    fn take(playground: &Playground) -> Self {
        Self {
            clock: playground.clock.clone(),
            balance: playground.balance,
            orders: playground.orders.clone(),
            trades: playground.trades.clone(),
        }
    }

    fn restore(self, playground: &mut Playground) {
        playground.clock = self.clock;
        playground.balance = self.balance;
        playground.orders = self.orders;
        playground.trades = self.trades;
    }
}

/// Fill price for a working order at the observed price, if it triggers.
///
/// Limits fill at the limit once the price is at or through it; stops fill
/// at the stop once touched; stop-limits need both and fill at the limit.
fn trigger_price(order: &OrderRecord, price: Decimal) -> Option<Decimal> {
    let buy = order.side().is_buy();
    let limit_ok = |limit: Decimal| if buy { price <= limit } else { price >= limit };
    let stop_hit = |stop: Decimal| if buy { price >= stop } else { price <= stop };

    match order.order_type() {
        OrderType::Market => Some(price),
        OrderType::Limit => order.limit_price().filter(|l| limit_ok(*l)),
        OrderType::Stop => order.stop_price().filter(|s| stop_hit(*s)),
        OrderType::StopLimit => {
            let stop = order.stop_price()?;
            let limit = order.limit_price()?;
            (stop_hit(stop) && limit_ok(limit)).then_some(limit)
        }
    }
}
