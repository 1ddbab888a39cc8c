//! Place Order Use Case
//!
//! Simulator orders are appended and left to the tick. A live order is
//! mirrored into its reconcile playground as one or two reconcile orders,
//! and only those reconcile orders are routed to the broker.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::application::EngineSettings;
use crate::application::dto::{PlaceOrderRequestDto, PlaceOrderResponseDto};
use crate::application::ports::{BrokerError, BrokerPort, PlaceEquityTradeRequest, StorePort};
use crate::application::services::{
    DEFAULT_REJECT_REASON, LockedPlaygrounds, PlaygroundRegistry, StatusUpdate, propagate_status,
    with_timeout,
};
use crate::domain::order::{OrderIntent, OrderRecord};
use crate::domain::playground::{Environment, Meta, PlaygroundError, mirror};
use crate::domain::shared::{OrderId, OrderRef, PlaygroundId};
use crate::error::EngineError;
use crate::observability::record_order_rejection;

/// Use case for placing an order in any playground.
pub struct PlaceOrderUseCase<B, S>
where
    B: BrokerPort,
    S: StorePort,
{
    broker: Arc<B>,
    store: Arc<S>,
    registry: Arc<PlaygroundRegistry>,
    settings: EngineSettings,
}

impl<B, S> PlaceOrderUseCase<B, S>
where
    B: BrokerPort,
    S: StorePort,
{
    /// Create a new PlaceOrderUseCase.
    pub fn new(
        broker: Arc<B>,
        store: Arc<S>,
        registry: Arc<PlaygroundRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            broker,
            store,
            registry,
            settings,
        }
    }

    /// Execute the use case.
    ///
    /// A live order whose reconcile order the broker refuses is rejected
    /// together with its reconcile orders, and the refusal is returned.
    pub async fn execute(&self, request: PlaceOrderRequestDto) -> Result<PlaceOrderResponseDto, EngineError> {
        let meta = self.registry.meta(&request.playground_id)?;
        request.order.validate()?;
        let perform_checks = request
            .perform_checks
            .unwrap_or_else(|| meta.environment.capabilities().perform_checks);

        match meta.environment {
            Environment::Simulator => {
                self.place_local(&request.playground_id, request.order, perform_checks, None)
                    .await
            }
            Environment::Reconcile => {
                let quote = self.quote(&request.order).await?;
                self.place_local(&request.playground_id, request.order, perform_checks, Some(quote))
                    .await
            }
            Environment::Live => {
                self.place_live(&request.playground_id, &meta, request.order, perform_checks)
                    .await
            }
        }
    }

    async fn place_local(
        &self,
        playground_id: &PlaygroundId,
        intent: OrderIntent,
        perform_checks: bool,
        quote: Option<Decimal>,
    ) -> Result<PlaceOrderResponseDto, EngineError> {
        let mut locked = self.registry.lock(playground_id).await?;
        let changes = locked
            .get(playground_id)?
            .place_order(intent, perform_checks, quote)?;
        let created = changes.apply(&mut locked)?;
        let order_ref = created
            .first()
            .ok_or_else(|| EngineError::internal("placement created no order"))?;
        let order = held_order(&locked, order_ref)?;

        self.store.save_order_record(&order, None, true).await?;
        self.registry
            .persist(self.store.as_ref(), locked.get(playground_id)?)
            .await?;

        tracing::info!(
            playground_id = %playground_id,
            order_id = %order.id(),
            symbol = %order.symbol(),
            side = %order.side(),
            quantity = %order.absolute_quantity(),
            "Order placed"
        );

        Ok(PlaceOrderResponseDto {
            order,
            reconcile_orders: Vec::new(),
        })
    }

    async fn place_live(
        &self,
        live_id: &PlaygroundId,
        meta: &Meta,
        intent: OrderIntent,
        perform_checks: bool,
    ) -> Result<PlaceOrderResponseDto, EngineError> {
        let reconcile_id = meta
            .reconcile_playground_id
            .clone()
            .ok_or_else(|| PlaygroundError::MissingReconcileLink(live_id.clone()))?;

        let quote = self.quote(&intent).await?;

        // Reconcile first; the plan decides which peer live playgrounds join.
        let mut locked = self.registry.lock(&reconcile_id).await?;
        let mut live_ids = {
            let reconcile = locked.get(&reconcile_id)?;
            mirror::plan(reconcile, &intent.symbol, intent.side, intent.quantity)
                .peer_playgrounds(live_id)
        };
        live_ids.push(live_id.clone());
        locked.extend(&self.registry, &live_ids).await?;

        let changes = locked
            .get(live_id)?
            .place_live_order(locked.get(&reconcile_id)?, intent, perform_checks, quote)?;
        let created = changes.apply(&mut locked)?;

        let live_ref = created
            .iter()
            .find(|r| &r.playground_id == live_id)
            .cloned()
            .ok_or_else(|| EngineError::internal("live placement created no live order"))?;
        let reconcile_refs: Vec<OrderRef> = created
            .iter()
            .filter(|r| r.playground_id == reconcile_id)
            .cloned()
            .collect();

        for order_ref in &created {
            let order = held_order(&locked, order_ref)?;
            self.store.save_order_record(&order, None, true).await?;
        }

        let routed = self.route(&mut locked, &reconcile_refs).await;

        for playground in locked.iter() {
            self.registry.persist(self.store.as_ref(), playground).await?;
        }

        let order = held_order(&locked, &live_ref)?;
        let reconcile_orders = reconcile_refs
            .iter()
            .map(|r| held_order(&locked, r))
            .collect::<Result<Vec<_>, _>>()?;

        if let Err(e) = routed {
            return Err(EngineError::from(e)
                .with_context("playground_id", live_id)
                .with_context("order_id", order.id()));
        }

        tracing::info!(
            playground_id = %live_id,
            order_id = %order.id(),
            symbol = %order.symbol(),
            side = %order.side(),
            quantity = %order.absolute_quantity(),
            reconcile_orders = reconcile_orders.len(),
            "Live order placed"
        );

        Ok(PlaceOrderResponseDto {
            order,
            reconcile_orders,
        })
    }

    /// Broker quote used as a brokered order's requested price.
    async fn quote(&self, intent: &OrderIntent) -> Result<Decimal, EngineError> {
        let quotes = with_timeout(
            self.settings.broker_timeout,
            self.broker.fetch_quotes(std::slice::from_ref(&intent.symbol)),
        )
        .await?;
        quotes
            .iter()
            .find(|q| q.symbol == intent.symbol)
            .map(|q| q.price_for(intent.side))
            .filter(|p| *p > Decimal::ZERO)
            .ok_or_else(|| {
                PlaygroundError::NoPrice {
                    symbol: intent.symbol.clone(),
                }
                .into()
            })
    }

    /// Route reconcile orders in order. The first refusal rejects that order
    /// and every one after it, along with the live orders they execute for.
    async fn route(
        &self,
        locked: &mut LockedPlaygrounds,
        reconcile_refs: &[OrderRef],
    ) -> Result<(), BrokerError> {
        let mut failure: Option<BrokerError> = None;

        for order_ref in reconcile_refs {
            if let Some(err) = &failure {
                self.reject_unrouted(locked, order_ref, &err.to_string()).await;
                continue;
            }

            let request = match held_order(locked, order_ref) {
                Ok(order) => PlaceEquityTradeRequest::from_order(&order),
                Err(e) => {
                    tracing::error!(order_ref = %order_ref, error = %e, "Reconcile order missing before routing");
                    continue;
                }
            };

            match with_timeout(self.settings.broker_timeout, self.broker.place_order(request)).await {
                Ok(external_id) => {
                    let recorded = match locked.get_mut(&order_ref.playground_id) {
                        Ok(reconcile) => reconcile
                            .set_external_id(&order_ref.order_id, external_id.clone())
                            .map_err(EngineError::from),
                        Err(e) => Err(e),
                    };
                    match recorded.and_then(|()| held_order(locked, order_ref)) {
                        Ok(order) => {
                            if let Err(e) = self.store.save_order_record(&order, None, false).await {
                                tracing::error!(order_id = %order.id(), error = %e, "Failed to save routed order");
                            }
                            tracing::info!(
                                order_id = %order.id(),
                                external_id = %external_id,
                                "Reconcile order routed"
                            );
                        }
                        Err(e) => {
                            tracing::error!(order_ref = %order_ref, error = %e, "Failed to record broker id");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(order_ref = %order_ref, error = %e, "Broker refused reconcile order");
                    self.reject_unrouted(locked, order_ref, &e.to_string()).await;
                    failure = Some(e);
                }
            }
        }

        failure.map_or(Ok(()), Err)
    }

    async fn reject_unrouted(&self, locked: &mut LockedPlaygrounds, order_ref: &OrderRef, reason: &str) {
        let reason = if reason.is_empty() {
            DEFAULT_REJECT_REASON
        } else {
            reason
        };
        match propagate_status(locked, order_ref, &StatusUpdate::Reject(reason.to_string())) {
            Ok(changed) => {
                for order in &changed {
                    if let Ok(playground) = locked.get(order.playground_id()) {
                        record_order_rejection(playground.environment());
                    }
                    if let Err(e) = self.store.save_order_record(order, None, false).await {
                        tracing::error!(order_id = %order.id(), error = %e, "Failed to save rejected order");
                    }
                }
            }
            Err(e) => {
                tracing::error!(order_ref = %order_ref, error = %e, "Failed to reject unrouted order");
            }
        }
    }
}

/// Clone an order out of a held playground.
fn held_order(locked: &LockedPlaygrounds, order_ref: &OrderRef) -> Result<OrderRecord, EngineError> {
    locked
        .get(&order_ref.playground_id)?
        .order(&order_ref.order_id)
        .cloned()
        .ok_or_else(|| order_not_found(&order_ref.playground_id, &order_ref.order_id))
}

fn order_not_found(playground_id: &PlaygroundId, order_id: &OrderId) -> EngineError {
    PlaygroundError::OrderNotFound {
        playground_id: playground_id.clone(),
        order_id: order_id.clone(),
    }
    .into()
}
