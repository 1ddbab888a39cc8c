//! Store Port (Driven Port)
//!
//! Persistence for playgrounds, live accounts, order records, and equity
//! plots. Playgrounds are stored as snapshots; queues are never persisted.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderRecord, OrderStatus};
use crate::domain::playground::{EquityPoint, LiveSource, PlaygroundSnapshot};
use crate::domain::shared::{ExternalOrderId, LiveAccountType, OrderId, PlaygroundId};

/// A broker account and the reconcile playground that shadows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveAccount {
    /// Broker account.
    pub source: LiveSource,
    /// Reconcile playground paired with the account.
    pub reconcile_playground_id: PlaygroundId,
    /// Live playgrounds mirroring into it.
    #[serde(default)]
    pub live_playground_ids: Vec<PlaygroundId>,
    /// Equity reported by the broker at bootstrap.
    pub starting_equity: Decimal,
    /// Bootstrap time.
    pub created_at: DateTime<Utc>,
}

/// Record of a playground saved to the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaygroundSession {
    /// Playground.
    pub playground_id: PlaygroundId,
    /// When the session was first saved.
    pub created_at: DateTime<Utc>,
    /// When the session was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Store errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Playground not in the store.
    #[error("playground {0} not found in store")]
    PlaygroundNotFound(PlaygroundId),

    /// Order record not in the store.
    #[error("order {0} not found in store")]
    OrderNotFound(OrderId),

    /// A stored order is terminal and the save would change it.
    #[error("order {order_id} is not open or pending (stored status {status})")]
    OrderIsNotOpenOrPending {
        /// Order id.
        order_id: OrderId,
        /// Stored status.
        status: OrderStatus,
    },

    /// `force_new` save of an order that already exists.
    #[error("order {0} already exists in store")]
    DuplicateOrder(OrderId),

    /// A live account for this source already exists.
    #[error("live account {0} already exists")]
    DuplicateLiveAccount(LiveSource),

    /// Backend failure.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Port for engine persistence.
#[async_trait]
pub trait StorePort: Send + Sync {
    /// Fetch a playground, whether saved as a session or held in memory.
    async fn fetch_playground(
        &self,
        id: &PlaygroundId,
    ) -> Result<Option<PlaygroundSnapshot>, StoreError>;

    /// Keep a playground that was not asked to be persisted.
    async fn save_in_memory_playground(&self, snapshot: &PlaygroundSnapshot)
    -> Result<(), StoreError>;

    /// Fetch the live account for a broker source.
    async fn fetch_live_account(&self, source: &LiveSource)
    -> Result<Option<LiveAccount>, StoreError>;

    /// Save a live account. With `overwrite` unset, an existing account for
    /// the source is a conflict.
    async fn save_live_account(&self, account: &LiveAccount, overwrite: bool)
    -> Result<(), StoreError>;

    /// Every pending or open order booked against an account type.
    async fn fetch_pending_orders(
        &self,
        account_type: LiveAccountType,
    ) -> Result<Vec<OrderRecord>, StoreError>;

    /// Find an order by its broker id.
    async fn find_order(
        &self,
        playground_id: &PlaygroundId,
        external_id: &ExternalOrderId,
    ) -> Result<Option<OrderRecord>, StoreError>;

    /// Save an order record, and the playground balance when given.
    ///
    /// Fails with [`StoreError::OrderIsNotOpenOrPending`] when the stored
    /// record is terminal and the new record has a different status.
    async fn save_order_record(
        &self,
        order: &OrderRecord,
        balance: Option<Decimal>,
        force_new: bool,
    ) -> Result<(), StoreError>;

    /// Persist a playground for the first time.
    async fn save_playground_session(
        &self,
        snapshot: &PlaygroundSnapshot,
    ) -> Result<PlaygroundSession, StoreError>;

    /// Replace a persisted playground.
    async fn update_playground_session(
        &self,
        snapshot: &PlaygroundSnapshot,
    ) -> Result<PlaygroundSession, StoreError>;

    /// Append one equity plot record.
    async fn save_equity_plot_record(
        &self,
        playground_id: &PlaygroundId,
        point: EquityPoint,
    ) -> Result<(), StoreError>;

    /// Equity plot records in insertion order.
    async fn fetch_equity_plot(
        &self,
        playground_id: &PlaygroundId,
    ) -> Result<Vec<EquityPoint>, StoreError>;

    /// Every live account.
    async fn load_live_accounts(&self) -> Result<Vec<LiveAccount>, StoreError>;

    /// Every persisted playground, in the order they were first saved.
    async fn load_playgrounds(&self) -> Result<Vec<PlaygroundSnapshot>, StoreError>;
}
