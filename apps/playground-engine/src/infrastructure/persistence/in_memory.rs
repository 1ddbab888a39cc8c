//! In-memory store.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::application::ports::{LiveAccount, PlaygroundSession, StoreError, StorePort};
use crate::domain::order::OrderRecord;
use crate::domain::playground::{EquityPoint, LiveSource, PlaygroundSnapshot};
use crate::domain::shared::{ExternalOrderId, LiveAccountType, OrderId, PlaygroundId};

/// Order records in save order.
#[derive(Debug, Default)]
struct OrderTable {
    records: HashMap<OrderId, OrderRecord>,
    order: Vec<OrderId>,
}

/// In-memory implementation of `StorePort`.
///
/// Holds both in-memory copies and persisted sessions; only sessions are
/// returned by [`StorePort::load_playgrounds`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    snapshots: RwLock<HashMap<PlaygroundId, PlaygroundSnapshot>>,
    sessions: RwLock<Vec<PlaygroundSession>>,
    live_accounts: RwLock<BTreeMap<LiveSource, LiveAccount>>,
    orders: RwLock<OrderTable>,
    balances: RwLock<HashMap<PlaygroundId, Decimal>>,
    equity_plots: RwLock<HashMap<PlaygroundId, Vec<EquityPoint>>>,
}

impl InMemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stored copy of an order.
    #[must_use]
    pub fn order(&self, order_id: &OrderId) -> Option<OrderRecord> {
        self.orders.read().records.get(order_id).cloned()
    }

    /// Number of stored orders.
    #[must_use]
    pub fn order_count(&self) -> usize {
        self.orders.read().order.len()
    }

    /// Last balance saved alongside an order of the playground.
    #[must_use]
    pub fn balance(&self, playground_id: &PlaygroundId) -> Option<Decimal> {
        self.balances.read().get(playground_id).copied()
    }

    /// Number of persisted sessions.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }
}

#[async_trait]
impl StorePort for InMemoryStore {
    async fn fetch_playground(
        &self,
        id: &PlaygroundId,
    ) -> Result<Option<PlaygroundSnapshot>, StoreError> {
        Ok(self.snapshots.read().get(id).cloned())
    }

    async fn save_in_memory_playground(
        &self,
        snapshot: &PlaygroundSnapshot,
    ) -> Result<(), StoreError> {
        self.snapshots
            .write()
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(())
    }

    async fn fetch_live_account(
        &self,
        source: &LiveSource,
    ) -> Result<Option<LiveAccount>, StoreError> {
        Ok(self.live_accounts.read().get(source).cloned())
    }

    async fn save_live_account(
        &self,
        account: &LiveAccount,
        overwrite: bool,
    ) -> Result<(), StoreError> {
        let mut accounts = self.live_accounts.write();
        if !overwrite && accounts.contains_key(&account.source) {
            return Err(StoreError::DuplicateLiveAccount(account.source.clone()));
        }
        accounts.insert(account.source.clone(), account.clone());
        Ok(())
    }

    async fn fetch_pending_orders(
        &self,
        account_type: LiveAccountType,
    ) -> Result<Vec<OrderRecord>, StoreError> {
        let table = self.orders.read();
        Ok(table
            .order
            .iter()
            .filter_map(|id| table.records.get(id))
            .filter(|o| o.account_type() == account_type && o.status().is_trading_allowed())
            .cloned()
            .collect())
    }

    async fn find_order(
        &self,
        playground_id: &PlaygroundId,
        external_id: &ExternalOrderId,
    ) -> Result<Option<OrderRecord>, StoreError> {
        Ok(self
            .orders
            .read()
            .records
            .values()
            .find(|o| o.playground_id() == playground_id && o.external_id() == Some(external_id))
            .cloned())
    }

    async fn save_order_record(
        &self,
        order: &OrderRecord,
        balance: Option<Decimal>,
        force_new: bool,
    ) -> Result<(), StoreError> {
        let mut table = self.orders.write();
        match table.records.get(order.id()) {
            Some(_) if force_new => {
                return Err(StoreError::DuplicateOrder(order.id().clone()));
            }
            Some(stored) if stored.status().is_terminal() && stored.status() != order.status() => {
                return Err(StoreError::OrderIsNotOpenOrPending {
                    order_id: order.id().clone(),
                    status: stored.status(),
                });
            }
            Some(_) => {}
            None => table.order.push(order.id().clone()),
        }
        table.records.insert(order.id().clone(), order.clone());
        drop(table);

        if let Some(balance) = balance {
            self.balances
                .write()
                .insert(order.playground_id().clone(), balance);
        }
        Ok(())
    }

    async fn save_playground_session(
        &self,
        snapshot: &PlaygroundSnapshot,
    ) -> Result<PlaygroundSession, StoreError> {
        let now = Utc::now();
        self.snapshots
            .write()
            .insert(snapshot.id.clone(), snapshot.clone());

        let mut sessions = self.sessions.write();
        if let Some(existing) = sessions.iter_mut().find(|s| s.playground_id == snapshot.id) {
            existing.updated_at = now;
            return Ok(existing.clone());
        }
        let session = PlaygroundSession {
            playground_id: snapshot.id.clone(),
            created_at: now,
            updated_at: now,
        };
        sessions.push(session.clone());
        Ok(session)
    }

    async fn update_playground_session(
        &self,
        snapshot: &PlaygroundSnapshot,
    ) -> Result<PlaygroundSession, StoreError> {
        let mut sessions = self.sessions.write();
        let session = sessions
            .iter_mut()
            .find(|s| s.playground_id == snapshot.id)
            .ok_or_else(|| StoreError::PlaygroundNotFound(snapshot.id.clone()))?;
        session.updated_at = Utc::now();
        let session = session.clone();
        drop(sessions);

        self.snapshots
            .write()
            .insert(snapshot.id.clone(), snapshot.clone());
        Ok(session)
    }

    async fn save_equity_plot_record(
        &self,
        playground_id: &PlaygroundId,
        point: EquityPoint,
    ) -> Result<(), StoreError> {
        self.equity_plots
            .write()
            .entry(playground_id.clone())
            .or_default()
            .push(point);
        Ok(())
    }

    async fn fetch_equity_plot(
        &self,
        playground_id: &PlaygroundId,
    ) -> Result<Vec<EquityPoint>, StoreError> {
        Ok(self
            .equity_plots
            .read()
            .get(playground_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn load_live_accounts(&self) -> Result<Vec<LiveAccount>, StoreError> {
        Ok(self.live_accounts.read().values().cloned().collect())
    }

    async fn load_playgrounds(&self) -> Result<Vec<PlaygroundSnapshot>, StoreError> {
        let snapshots = self.snapshots.read();
        Ok(self
            .sessions
            .read()
            .iter()
            .filter_map(|s| snapshots.get(&s.playground_id).cloned())
            .collect())
    }
}
