//! Updates the poll hands to the drain step.

use crate::application::ports::OrderSnapshot;
use crate::application::services::StatusUpdate;
use crate::domain::order::OrderRecord;
use crate::domain::shared::{ExternalOrderId, PlaygroundId};

/// Field changed by a [`LiveOrderUpdate::Modify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateField {
    /// Order status.
    Status,
}

/// A broker observation about a routed reconcile order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveOrderUpdate {
    /// The broker holds a new state for the order, typically a fill.
    Create {
        /// Broker view.
        order: OrderSnapshot,
        /// Local reconcile order.
        order_record: OrderRecord,
    },
    /// A single field of the local order must change.
    Modify {
        /// Reconcile playground.
        playground_id: PlaygroundId,
        /// Broker order id.
        external_id: ExternalOrderId,
        /// Field to change.
        field: UpdateField,
        /// New status.
        new_value: StatusUpdate,
    },
}

impl LiveOrderUpdate {
    /// Broker order id the update is about.
    #[must_use]
    pub const fn external_id(&self) -> &ExternalOrderId {
        match self {
            Self::Create { order, .. } => &order.id,
            Self::Modify { external_id, .. } => external_id,
        }
    }
}
