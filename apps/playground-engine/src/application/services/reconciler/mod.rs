//! Reconciler
//!
//! Background pipeline that keeps reconcile playgrounds in step with the
//! broker and carries every broker outcome over to the live orders each
//! reconcile order executes for.
//!
//! One pass runs three steps in order:
//!
//! 1. **Poll**: fetch every routed reconcile order that still works and ask
//!    the broker for its state, pausing between calls. Changes become
//!    [`LiveOrderUpdate`]s on a bounded queue.
//! 2. **Drain**: fills go to the [`OrderCache`]; status changes are applied
//!    to the reconcile order and propagated to its live orders.
//! 3. **Commit**: cached fills are committed to the reconcile order first and
//!    then to each live order, in broker id order.
//!
//! The drift audits ([`Reconciler::audit_positions`],
//! [`Reconciler::audit_orders`]) only report; they never change state.

mod live_order_update;
mod order_cache;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub use live_order_update::{LiveOrderUpdate, UpdateField};
pub use order_cache::{ExecutionFillRequest, OrderCache};

use super::broker_call::with_timeout;
use super::order_sync::{DEFAULT_REJECT_REASON, StatusUpdate, propagate_status};
use super::playground_registry::{LockedPlaygrounds, PlaygroundRegistry};
use crate::application::EngineSettings;
use crate::application::ports::{
    BrokerError, BrokerOrderStatus, BrokerPort, StoreError, StorePort,
};
use crate::domain::order::{OrderRecord, OrderStatus};
use crate::domain::playground::{Environment, FillEntry, FillOutcome, PlaygroundError};
use crate::domain::shared::{EventQueue, ExternalOrderId, Instrument, LiveAccountType, PlaygroundId};
use crate::error::{EngineError, ErrorKind};
use crate::observability::{
    record_broker_poll, record_cache_drop, record_order_fill, record_order_rejection,
    update_order_cache_size,
};

/// Counts from one reconciler pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    /// Broker orders polled.
    pub polled: usize,
    /// Updates queued by the poll.
    pub updates_queued: usize,
    /// Fills newly cached by the drain.
    pub fills_cached: usize,
    /// Status changes applied by the drain.
    pub statuses_applied: usize,
    /// Cached fills committed.
    pub committed: usize,
    /// Cached fills dropped without a state change.
    pub dropped: usize,
    /// Errors logged during the pass.
    pub errors: usize,
}

impl ReconcileReport {
    /// Returns true if the pass touched anything.
    #[must_use]
    pub const fn has_activity(&self) -> bool {
        self.updates_queued > 0 || self.committed > 0 || self.dropped > 0 || self.errors > 0
    }
}

/// Reconcile position that disagrees with the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionDrift {
    /// Reconcile playground.
    pub playground_id: PlaygroundId,
    /// Symbol.
    pub symbol: Instrument,
    /// Signed quantity held by the reconcile playground.
    pub local: Decimal,
    /// Signed quantity reported by the broker.
    pub broker: Decimal,
}

/// Poll, drain, and commit steps over one broker.
pub struct Reconciler<B, S>
where
    B: BrokerPort,
    S: StorePort,
{
    broker: Arc<B>,
    store: Arc<S>,
    registry: Arc<PlaygroundRegistry>,
    settings: EngineSettings,
    updates: EventQueue<LiveOrderUpdate>,
    cache: Arc<OrderCache>,
    internal_errors: Mutex<HashMap<ExternalOrderId, u32>>,
}

impl<B, S> Reconciler<B, S>
where
    B: BrokerPort + 'static,
    S: StorePort + 'static,
{
    /// Create a reconciler.
    pub fn new(
        broker: Arc<B>,
        store: Arc<S>,
        registry: Arc<PlaygroundRegistry>,
        settings: EngineSettings,
    ) -> Self {
        let updates = EventQueue::new("live_order_updates", settings.queue_capacity);
        Self {
            broker,
            store,
            registry,
            settings,
            updates,
            cache: Arc::new(OrderCache::new()),
            internal_errors: Mutex::new(HashMap::new()),
        }
    }

    /// Cached fills waiting for commit.
    #[must_use]
    pub fn cache(&self) -> Arc<OrderCache> {
        Arc::clone(&self.cache)
    }

    /// Updates waiting for the drain step.
    #[must_use]
    pub fn pending_updates(&self) -> usize {
        self.updates.len()
    }

    /// Run passes every `commit_interval` until `shutdown` is cancelled.
    ///
    /// A pass in progress finishes before the loop observes cancellation.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.settings.commit_interval);

            tracing::info!(
                broker = self.broker.name(),
                commit_interval_ms = self.settings.commit_interval.as_millis() as u64,
                poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
                "Reconciler started"
            );

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        let report = self.run_once().await;
                        if report.has_activity() {
                            tracing::debug!(?report, "Reconciler pass complete");
                        }
                    }
                    () = shutdown.cancelled() => {
                        tracing::info!("Reconciler shutting down");
                        break;
                    }
                }
            }
        })
    }

    /// One poll, drain, and commit pass.
    pub async fn run_once(&self) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        self.poll(&mut report).await;
        self.drain(&mut report).await;
        self.commit_pending_orders(&mut report).await;
        report
    }

    // ========================================================================
    // Poll
    // ========================================================================

    /// Ask the broker about every routed reconcile order that still works and
    /// queue what changed.
    pub async fn poll(&self, report: &mut ReconcileReport) {
        let orders = match self
            .store
            .fetch_pending_orders(LiveAccountType::Reconciliation)
            .await
        {
            Ok(orders) => orders,
            Err(e) => {
                tracing::error!(error = %e, "Failed to load pending reconcile orders");
                report.errors += 1;
                return;
            }
        };

        let mut first = true;
        for order in &orders {
            let Some(external_id) = order.external_id() else {
                continue;
            };
            let Some(account_type) = self.account_type_for(order.playground_id()) else {
                continue;
            };

            if !first {
                tokio::time::sleep(self.settings.poll_interval).await;
            }
            first = false;
            report.polled += 1;

            let snapshot = match with_timeout(
                self.settings.broker_timeout,
                self.broker.fetch_order(external_id, account_type),
            )
            .await
            {
                Ok(snapshot) => snapshot,
                Err(e) if e.is_transient() => {
                    tracing::warn!(external_id = %external_id, error = %e, "Broker poll failed, retrying next pass");
                    record_broker_poll("transient");
                    continue;
                }
                Err(BrokerError::OrderNotFound { .. }) => {
                    tracing::warn!(external_id = %external_id, "Broker does not know routed order");
                    record_broker_poll("not_found");
                    continue;
                }
                Err(e) => {
                    tracing::error!(external_id = %external_id, error = %e, "Broker poll failed");
                    record_broker_poll("error");
                    report.errors += 1;
                    continue;
                }
            };

            let status = match snapshot.parsed_status() {
                Ok(status) => status,
                Err(e) => {
                    tracing::error!(external_id = %external_id, error = %e, "Skipping broker order");
                    record_broker_poll("unknown_status");
                    report.errors += 1;
                    continue;
                }
            };
            record_broker_poll("ok");

            let modify = |new_value: StatusUpdate| LiveOrderUpdate::Modify {
                playground_id: order.playground_id().clone(),
                external_id: external_id.clone(),
                field: UpdateField::Status,
                new_value,
            };
            let update = match status {
                BrokerOrderStatus::Filled => Some(LiveOrderUpdate::Create {
                    order: snapshot.clone(),
                    order_record: order.clone(),
                }),
                BrokerOrderStatus::Rejected => Some(modify(StatusUpdate::Reject(
                    snapshot
                        .reason_description
                        .clone()
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| DEFAULT_REJECT_REASON.to_string()),
                ))),
                BrokerOrderStatus::Canceled | BrokerOrderStatus::Expired => {
                    Some(modify(StatusUpdate::Cancel))
                }
                BrokerOrderStatus::Open if order.status() == OrderStatus::Pending => {
                    Some(modify(StatusUpdate::Accept))
                }
                _ => None,
            };

            if let Some(update) = update {
                if let Err(e) = self.updates.enqueue(update) {
                    tracing::warn!(error = %e, "Update queue full, remaining orders wait for next pass");
                    break;
                }
                report.updates_queued += 1;
            }
        }
    }

    /// Broker account type behind a reconcile playground, if this reconciler
    /// owns it.
    fn account_type_for(&self, playground_id: &PlaygroundId) -> Option<LiveAccountType> {
        let meta = match self.registry.meta(playground_id) {
            Ok(meta) => meta,
            Err(e) => {
                tracing::warn!(playground_id = %playground_id, error = %e, "Pending order for unregistered playground");
                return None;
            }
        };
        let source = meta.source?;
        (source.broker == self.broker.name()).then_some(source.account_type)
    }

    // ========================================================================
    // Drain
    // ========================================================================

    /// Apply queued updates: cache fills, apply status changes.
    pub async fn drain(&self, report: &mut ReconcileReport) {
        while let Some(update) = self.updates.dequeue() {
            match update {
                LiveOrderUpdate::Create {
                    order,
                    order_record,
                } => match order.parsed_status() {
                    Ok(BrokerOrderStatus::Filled) => {
                        let quantity = if order.last_fill_quantity > Decimal::ZERO {
                            order.last_fill_quantity
                        } else {
                            order_record.remaining_quantity()
                        };
                        let request = ExecutionFillRequest {
                            playground_id: order_record.playground_id().clone(),
                            fill: FillEntry {
                                time: order.create_date,
                                price: order.avg_fill_price,
                                quantity,
                            },
                        };
                        if self.cache.insert(order.id.clone(), request).await {
                            report.fills_cached += 1;
                        }
                    }
                    Ok(BrokerOrderStatus::Pending) => {}
                    Ok(status) => {
                        tracing::error!(external_id = %order.id, %status, "Unexpected status on create update");
                        report.errors += 1;
                    }
                    Err(e) => {
                        tracing::error!(external_id = %order.id, error = %e, "Unreadable status on create update");
                        report.errors += 1;
                    }
                },
                LiveOrderUpdate::Modify {
                    playground_id,
                    external_id,
                    field: UpdateField::Status,
                    new_value: update,
                } => {
                    match self.apply_status(&playground_id, &external_id, &update).await {
                        Ok(()) => report.statuses_applied += 1,
                        Err(e) => {
                            tracing::error!(
                                playground_id = %playground_id,
                                external_id = %external_id,
                                %update,
                                error = %e,
                                "Failed to apply broker status"
                            );
                            report.errors += 1;
                        }
                    }
                }
            }
        }

        update_order_cache_size(self.cache.len().await);
    }

    /// Apply a status change to a reconcile order and its live orders, then
    /// write the changed records through.
    async fn apply_status(
        &self,
        playground_id: &PlaygroundId,
        external_id: &ExternalOrderId,
        update: &StatusUpdate,
    ) -> Result<(), EngineError> {
        let mut locked = self.registry.lock(playground_id).await?;
        let (order_ref, live_ids) = {
            let reconcile = locked.get(playground_id)?;
            let record = reconcile.order_by_external_id(external_id).ok_or_else(|| {
                PlaygroundError::ExternalOrderNotFound {
                    playground_id: playground_id.clone(),
                    external_id: external_id.clone(),
                }
            })?;
            (record.order_ref(), live_playground_ids(record))
        };
        for missing in locked.extend_registered(&self.registry, &live_ids).await {
            tracing::warn!(
                playground_id = %missing,
                external_id = %external_id,
                "Live playground not registered; reconcile order updated alone"
            );
        }

        let changed = propagate_status(&mut locked, &order_ref, update)?;
        if matches!(update, StatusUpdate::Reject(_)) {
            for order in &changed {
                if let Ok(playground) = locked.get(order.playground_id()) {
                    record_order_rejection(playground.environment());
                }
            }
        }

        self.write_through(&locked, &changed).await?;
        Ok(())
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Commit cached fills in broker id order. The cache stays locked for
    /// the whole step.
    pub async fn commit_pending_orders(&self, report: &mut ReconcileReport) {
        let mut entries = self.cache.get_map().await;
        let mut keys: Vec<ExternalOrderId> = entries.keys().cloned().collect();
        keys.sort();

        for external_id in keys {
            let Some(request) = entries.get(&external_id).cloned() else {
                continue;
            };

            match self.commit_fill(&external_id, &request).await {
                Ok(()) => {
                    entries.remove(&external_id);
                    self.internal_errors.lock().remove(&external_id);
                    report.committed += 1;
                }
                Err(e) if matches!(e.kind(), ErrorKind::TradingNotAllowed | ErrorKind::NotFound) => {
                    tracing::warn!(
                        external_id = %external_id,
                        error = %e,
                        "Dropping cached fill"
                    );
                    record_cache_drop(e.kind().as_str());
                    entries.remove(&external_id);
                    report.dropped += 1;
                }
                Err(e) => {
                    report.errors += 1;
                    let attempts = {
                        let mut errors = self.internal_errors.lock();
                        let count = errors.entry(external_id.clone()).or_insert(0);
                        *count += 1;
                        *count
                    };
                    tracing::error!(
                        external_id = %external_id,
                        attempts,
                        error = %e,
                        "Failed to commit cached fill"
                    );
                    if attempts >= self.settings.max_internal_errors {
                        record_cache_drop("internal");
                        entries.remove(&external_id);
                        self.internal_errors.lock().remove(&external_id);
                        report.dropped += 1;
                    }
                }
            }
        }

        update_order_cache_size(entries.len());
    }

    /// Commit one broker fill to its reconcile order, then to every live
    /// order the reconcile order executes for.
    async fn commit_fill(
        &self,
        external_id: &ExternalOrderId,
        request: &ExecutionFillRequest,
    ) -> Result<(), EngineError> {
        let playground_id = &request.playground_id;
        let mut locked = self.registry.lock(playground_id).await?;
        let (order_id, targets) = {
            let reconcile = locked.get(playground_id)?;
            let record = reconcile.order_by_external_id(external_id).ok_or_else(|| {
                PlaygroundError::ExternalOrderNotFound {
                    playground_id: playground_id.clone(),
                    external_id: external_id.clone(),
                }
            })?;
            (record.id().clone(), record.reconciles().to_vec())
        };
        let live_ids: Vec<PlaygroundId> = targets.iter().map(|t| t.playground_id.clone()).collect();
        locked.extend_registered(&self.registry, &live_ids).await;

        let reconcile = locked.get_mut(playground_id)?;
        let trade = match reconcile.commit_pending_order(&order_id, &request.fill, false)? {
            FillOutcome::Filled(trade) => trade,
            FillOutcome::Rejected(order) => {
                return Err(EngineError::internal("unchecked reconcile fill was rejected")
                    .with_context("order_id", order.id()));
            }
        };
        record_order_fill(Environment::Reconcile);
        let mut changed = vec![reconcile.order(&order_id).cloned().ok_or_else(|| {
            EngineError::internal("filled reconcile order vanished").with_context("order_id", &order_id)
        })?];

        tracing::info!(
            playground_id = %playground_id,
            order_id = %order_id,
            external_id = %external_id,
            quantity = %trade.quantity(),
            price = %trade.price(),
            "Reconcile order filled"
        );

        let fill = FillEntry {
            quantity: trade.quantity().abs(),
            ..request.fill
        };
        for target in targets {
            let Ok(live) = locked.get_mut(&target.playground_id) else {
                tracing::warn!(
                    playground_id = %target.playground_id,
                    order_id = %target.order_id,
                    "Live playground not registered, skipping"
                );
                continue;
            };
            match live.commit_pending_order(&target.order_id, &fill, false) {
                Ok(FillOutcome::Filled(live_trade)) => {
                    record_order_fill(live.environment());
                    if let Err(e) = live.enqueue_new_trade(live_trade) {
                        tracing::error!(
                            playground_id = %target.playground_id,
                            error = %e,
                            "Live trade not queued"
                        );
                    }
                }
                Ok(FillOutcome::Rejected(_)) => {}
                Err(PlaygroundError::TradingNotAllowed { order_id, status }) => {
                    tracing::warn!(
                        playground_id = %target.playground_id,
                        order_id = %order_id,
                        %status,
                        "Live order no longer accepts fills, skipping"
                    );
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        playground_id = %target.playground_id,
                        order_id = %target.order_id,
                        error = %e,
                        "Failed to fill live order"
                    );
                    continue;
                }
            }
            if let Some(order) = live.order(&target.order_id) {
                changed.push(order.clone());
            }
        }

        self.write_through(&locked, &changed).await?;
        Ok(())
    }

    /// Save changed order records with their playground's balance, then
    /// every held playground.
    async fn write_through(
        &self,
        locked: &LockedPlaygrounds,
        changed: &[OrderRecord],
    ) -> Result<(), StoreError> {
        for order in changed {
            let balance = locked.get(order.playground_id()).ok().map(|p| p.balance());
            self.store.save_order_record(order, balance, false).await?;
        }
        for playground in locked.iter() {
            self.registry.persist(self.store.as_ref(), playground).await?;
        }
        Ok(())
    }

    // ========================================================================
    // Audits
    // ========================================================================

    /// Compare each reconcile playground's positions with the broker's.
    ///
    /// Only live accounts on this reconciler's broker are compared.
    pub async fn audit_positions(&self) -> Result<Vec<PositionDrift>, EngineError> {
        let broker_positions = with_timeout(self.settings.broker_timeout, self.broker.fetch_positions()).await?;
        let broker_by_symbol: BTreeMap<Instrument, Decimal> = broker_positions
            .into_iter()
            .map(|p| (p.symbol, p.quantity))
            .collect();

        let mut drift = Vec::new();
        for account in self.registry.live_accounts() {
            if account.source.broker != self.broker.name() {
                continue;
            }
            let locked = self.registry.lock(&account.reconcile_playground_id).await?;
            let reconcile = locked.get(&account.reconcile_playground_id)?;
            let local: BTreeMap<Instrument, Decimal> = reconcile
                .positions()
                .into_iter()
                .map(|(symbol, position)| (symbol, position.quantity))
                .collect();

            let symbols: BTreeSet<&Instrument> =
                local.keys().chain(broker_by_symbol.keys()).collect();
            for symbol in symbols {
                let local_quantity = local.get(symbol).copied().unwrap_or_default();
                let broker_quantity = broker_by_symbol.get(symbol).copied().unwrap_or_default();
                if local_quantity != broker_quantity {
                    tracing::warn!(
                        playground_id = %account.reconcile_playground_id,
                        symbol = %symbol,
                        local = %local_quantity,
                        broker = %broker_quantity,
                        "Reconcile position drifted from broker"
                    );
                    drift.push(PositionDrift {
                        playground_id: account.reconcile_playground_id.clone(),
                        symbol: symbol.clone(),
                        local: local_quantity,
                        broker: broker_quantity,
                    });
                }
            }
        }
        Ok(drift)
    }

    /// Broker orders no reconcile playground knows about.
    pub async fn audit_orders(&self) -> Result<Vec<ExternalOrderId>, EngineError> {
        let orders = with_timeout(self.settings.broker_timeout, self.broker.fetch_orders()).await?;
        let reconcile_ids: Vec<PlaygroundId> = self
            .registry
            .live_accounts()
            .into_iter()
            .filter(|a| a.source.broker == self.broker.name())
            .map(|a| a.reconcile_playground_id)
            .collect();

        let mut unknown = Vec::new();
        for order in orders {
            let mut found = false;
            for playground_id in &reconcile_ids {
                if self.store.find_order(playground_id, &order.id).await?.is_some() {
                    found = true;
                    break;
                }
            }
            if !found {
                tracing::warn!(external_id = %order.id, status = %order.status, "Broker order unknown to every reconcile playground");
                unknown.push(order.id);
            }
        }
        Ok(unknown)
    }
}

/// Live playgrounds a reconcile order executes for, deduplicated.
fn live_playground_ids(record: &OrderRecord) -> Vec<PlaygroundId> {
    let mut ids: Vec<PlaygroundId> = record
        .reconciles()
        .iter()
        .map(|r| r.playground_id.clone())
        .collect();
    ids.sort();
    ids.dedup();
    ids
}
