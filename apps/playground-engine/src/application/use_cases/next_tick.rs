//! Next Tick Use Case

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;

use crate::application::dto::NextTickRequestDto;
use crate::application::ports::StorePort;
use crate::application::services::PlaygroundRegistry;
use crate::domain::playground::{Environment, TickDelta, TickEvent};
use crate::domain::shared::OrderId;
use crate::error::EngineError;
use crate::observability::{record_invalid_order, record_liquidation, record_order_fill};

/// Use case for advancing a playground.
///
/// A live playground's clock is synced to wall time first and its queues
/// are drained; the requested duration only moves simulator clocks.
pub struct NextTickUseCase<S>
where
    S: StorePort,
{
    store: Arc<S>,
    registry: Arc<PlaygroundRegistry>,
}

impl<S> NextTickUseCase<S>
where
    S: StorePort,
{
    /// Create a new NextTickUseCase.
    pub fn new(store: Arc<S>, registry: Arc<PlaygroundRegistry>) -> Self {
        Self { store, registry }
    }

    /// Execute the use case.
    pub async fn execute(&self, request: NextTickRequestDto) -> Result<TickDelta, EngineError> {
        let duration = chrono::Duration::try_seconds(request.seconds).ok_or_else(|| {
            EngineError::validation(format!("tick of {}s is out of range", request.seconds))
        })?;

        let mut locked = self.registry.lock(&request.playground_id).await?;
        let playground = locked.get_mut(&request.playground_id)?;
        let environment = playground.environment();
        if environment == Environment::Live {
            playground.sync_clock(Utc::now());
        }

        let delta = playground.tick(duration, request.is_preview)?;
        if request.is_preview {
            return Ok(delta);
        }

        for _ in &delta.new_trades {
            record_order_fill(environment);
        }
        for order in &delta.invalid_orders {
            record_invalid_order(environment, order.status());
        }

        let mut touched: BTreeSet<OrderId> = delta
            .new_trades
            .iter()
            .map(|t| t.order_id().clone())
            .collect();
        touched.extend(delta.invalid_orders.iter().map(|o| o.id().clone()));
        for event in &delta.events {
            match event {
                TickEvent::Liquidation {
                    equity,
                    maintenance_margin,
                    orders_placed,
                } => {
                    record_liquidation();
                    tracing::warn!(
                        playground_id = %request.playground_id,
                        equity = %equity,
                        maintenance_margin = %maintenance_margin,
                        orders = orders_placed.len(),
                        "Playground liquidated"
                    );
                    touched.extend(orders_placed.iter().map(|o| o.id().clone()));
                }
            }
        }

        let balance = playground.balance();
        for order_id in &touched {
            if let Some(order) = playground.order(order_id) {
                self.store.save_order_record(order, Some(balance), false).await?;
            }
        }
        for point in &delta.equity_plot {
            self.store
                .save_equity_plot_record(&request.playground_id, *point)
                .await?;
        }
        self.registry.persist(self.store.as_ref(), playground).await?;

        tracing::debug!(
            playground_id = %request.playground_id,
            current_time = %delta.current_time,
            trades = delta.new_trades.len(),
            candles = delta.new_candles.len(),
            invalid_orders = delta.invalid_orders.len(),
            complete = delta.is_backtest_complete,
            "Tick"
        );

        Ok(delta)
    }
}
