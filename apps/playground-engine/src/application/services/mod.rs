//! Application Services
//!
//! Shared machinery the use cases and the reconciler build on: the
//! playground registry and its lock order, live candle feeds, broker status
//! propagation, and the reconciliation pipeline.

mod broker_call;
mod live_feeds;
mod order_sync;
mod playground_registry;
mod reconciler;

pub use broker_call::with_timeout;
pub use live_feeds::LiveFeedRegistry;
pub use order_sync::{DEFAULT_REJECT_REASON, StatusUpdate, propagate_status};
pub use playground_registry::{LockedPlaygrounds, PlaygroundRegistry};
pub use reconciler::{
    ExecutionFillRequest, LiveOrderUpdate, OrderCache, PositionDrift, ReconcileReport, Reconciler,
    UpdateField,
};
