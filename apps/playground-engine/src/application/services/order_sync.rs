//! Broker-driven status changes on reconcile orders, carried over to the live
//! orders they execute for.

use std::fmt;

use crate::application::services::LockedPlaygrounds;
use crate::domain::order::{OrderRecord, OrderStatus};
use crate::domain::shared::OrderRef;
use crate::error::EngineError;

/// Reason recorded when the broker rejects without one.
pub const DEFAULT_REJECT_REASON: &str = "rejected by broker";

/// A status change reported for a reconcile order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The broker accepted the order.
    Accept,
    /// The broker rejected the order.
    Reject(String),
    /// The order was canceled or expired at the broker.
    Cancel,
}

impl fmt::Display for StatusUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => f.write_str("accept"),
            Self::Cancel => f.write_str("cancel"),
            Self::Reject(reason) => write!(f, "reject ({reason})"),
        }
    }
}

/// Apply `update` to a reconcile order, then to each live order it reconciles.
///
/// The reconcile transition must succeed. Live orders already past the
/// transition are skipped; a partially filled live order that would be
/// rejected is canceled instead. Returns every record changed, reconcile
/// order first.
pub fn propagate_status(
    locked: &mut LockedPlaygrounds,
    reconcile: &OrderRef,
    update: &StatusUpdate,
) -> Result<Vec<OrderRecord>, EngineError> {
    let playground = locked.get_mut(&reconcile.playground_id)?;
    let record = match update {
        StatusUpdate::Accept => playground.accept_order(&reconcile.order_id)?,
        StatusUpdate::Reject(reason) => playground.reject_order(&reconcile.order_id, reason)?,
        StatusUpdate::Cancel => playground.cancel_order(&reconcile.order_id)?,
    }
    .clone();

    tracing::info!(
        playground_id = %reconcile.playground_id,
        order_id = %reconcile.order_id,
        status = %record.status(),
        "Reconcile order updated"
    );

    let targets = record.reconciles().to_vec();
    let mut changed = vec![record];

    for target in targets {
        let Ok(live) = locked.get_mut(&target.playground_id) else {
            tracing::warn!(
                playground_id = %target.playground_id,
                order_id = %target.order_id,
                "Live playground not held; status not propagated"
            );
            continue;
        };
        let Some(status) = live.order(&target.order_id).map(OrderRecord::status) else {
            tracing::warn!(
                playground_id = %target.playground_id,
                order_id = %target.order_id,
                "Linked live order missing"
            );
            continue;
        };

        let applied = match (update, status) {
            (StatusUpdate::Accept, OrderStatus::Pending) => {
                Some(live.accept_order(&target.order_id)?)
            }
            (StatusUpdate::Reject(reason), s) if s.is_open_or_pending() => {
                Some(live.reject_order(&target.order_id, reason)?)
            }
            (StatusUpdate::Reject(_) | StatusUpdate::Cancel, s) if s.is_trading_allowed() => {
                Some(live.cancel_order(&target.order_id)?)
            }
            _ => None,
        };

        match applied {
            Some(order) => changed.push(order.clone()),
            None => tracing::debug!(
                playground_id = %target.playground_id,
                order_id = %target.order_id,
                status = %status,
                update = %update,
                "Live order already past update"
            ),
        }
    }

    Ok(changed)
}
