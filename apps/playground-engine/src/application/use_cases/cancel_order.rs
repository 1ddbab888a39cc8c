//! Cancel Order Use Case
//!
//! Only orders that never reached the broker can be canceled locally. A live
//! order is canceled through its reconcile orders, which also cancels any
//! peer closing orders tied to them.

use std::sync::Arc;

use crate::application::dto::{CancelOrderRequestDto, CancelOrderResponseDto};
use crate::application::ports::StorePort;
use crate::application::services::{PlaygroundRegistry, StatusUpdate, propagate_status};
use crate::domain::order::{OrderRecord, OrderStatus};
use crate::domain::playground::{Environment, PlaygroundError};
use crate::domain::shared::{OrderId, OrderRef, PlaygroundId};
use crate::error::EngineError;

/// Use case for canceling a working order.
pub struct CancelOrderUseCase<S>
where
    S: StorePort,
{
    store: Arc<S>,
    registry: Arc<PlaygroundRegistry>,
}

impl<S> CancelOrderUseCase<S>
where
    S: StorePort,
{
    /// Create a new CancelOrderUseCase.
    pub fn new(store: Arc<S>, registry: Arc<PlaygroundRegistry>) -> Self {
        Self { store, registry }
    }

    /// Execute the use case.
    pub async fn execute(&self, request: CancelOrderRequestDto) -> Result<CancelOrderResponseDto, EngineError> {
        let meta = self.registry.meta(&request.playground_id)?;
        match (meta.environment, meta.reconcile_playground_id) {
            (Environment::Live, Some(reconcile_id)) => {
                self.cancel_live(&request.playground_id, &reconcile_id, &request.order_id)
                    .await
            }
            (Environment::Live, None) => {
                Err(PlaygroundError::MissingReconcileLink(request.playground_id).into())
            }
            _ => self.cancel_local(&request.playground_id, &request.order_id).await,
        }
    }

    async fn cancel_local(
        &self,
        playground_id: &PlaygroundId,
        order_id: &OrderId,
    ) -> Result<CancelOrderResponseDto, EngineError> {
        let mut locked = self.registry.lock(playground_id).await?;
        let playground = locked.get_mut(playground_id)?;
        let existing = playground.order(order_id).ok_or_else(|| PlaygroundError::OrderNotFound {
            playground_id: playground_id.clone(),
            order_id: order_id.clone(),
        })?;
        if let Some(external_id) = existing.external_id() {
            return Err(PlaygroundError::AlreadyRouted {
                order_id: order_id.clone(),
                external_id: external_id.clone(),
            }
            .into());
        }

        let order = playground.cancel_order(order_id)?.clone();
        self.store
            .save_order_record(&order, Some(playground.balance()), false)
            .await?;
        self.registry.persist(self.store.as_ref(), playground).await?;

        tracing::info!(playground_id = %playground_id, order_id = %order_id, "Order canceled");

        Ok(CancelOrderResponseDto {
            order,
            reconcile_orders: Vec::new(),
        })
    }

    async fn cancel_live(
        &self,
        live_id: &PlaygroundId,
        reconcile_id: &PlaygroundId,
        order_id: &OrderId,
    ) -> Result<CancelOrderResponseDto, EngineError> {
        let live_ref = OrderRef::new(live_id.clone(), order_id.clone());

        let mut locked = self.registry.lock(reconcile_id).await?;
        let (reconcile_refs, mut live_ids) = {
            let reconcile = locked.get(reconcile_id)?;
            let linked: Vec<&OrderRecord> = reconcile
                .orders()
                .iter()
                .filter(|o| o.reconciles().contains(&live_ref))
                .collect();
            for order in &linked {
                if let Some(external_id) = order.external_id() {
                    return Err(PlaygroundError::AlreadyRouted {
                        order_id: order_id.clone(),
                        external_id: external_id.clone(),
                    }
                    .into());
                }
            }
            let live_ids: Vec<PlaygroundId> = linked
                .iter()
                .flat_map(|o| o.reconciles().iter().map(|r| r.playground_id.clone()))
                .collect();
            let refs: Vec<OrderRef> = linked.iter().map(|o| o.order_ref()).collect();
            (refs, live_ids)
        };
        live_ids.push(live_id.clone());
        locked.extend(&self.registry, &live_ids).await?;

        locked
            .get(live_id)?
            .order(order_id)
            .ok_or_else(|| PlaygroundError::OrderNotFound {
                playground_id: live_id.clone(),
                order_id: order_id.clone(),
            })?;

        let mut changed = Vec::new();
        for reconcile_ref in &reconcile_refs {
            changed.extend(propagate_status(&mut locked, reconcile_ref, &StatusUpdate::Cancel)?);
        }

        let live = locked.get_mut(live_id)?;
        let still_working = live
            .order(order_id)
            .is_some_and(|o| o.status() != OrderStatus::Canceled);
        if still_working {
            changed.push(live.cancel_order(order_id)?.clone());
        }

        for order in &changed {
            let balance = locked.get(order.playground_id()).ok().map(|p| p.balance());
            self.store.save_order_record(order, balance, false).await?;
        }
        for playground in locked.iter() {
            self.registry.persist(self.store.as_ref(), playground).await?;
        }

        let order = locked
            .get(live_id)?
            .order(order_id)
            .cloned()
            .ok_or_else(|| EngineError::internal("canceled live order vanished"))?;
        let reconcile_orders: Vec<OrderRecord> = changed
            .into_iter()
            .filter(|o| o.playground_id() == reconcile_id)
            .collect();

        tracing::info!(
            playground_id = %live_id,
            order_id = %order_id,
            reconcile_orders = reconcile_orders.len(),
            "Live order canceled"
        );

        Ok(CancelOrderResponseDto {
            order,
            reconcile_orders,
        })
    }
}
