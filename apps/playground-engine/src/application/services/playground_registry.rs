//! Playground Registry
//!
//! Holds every in-memory playground behind its own async mutex, the live
//! accounts, and which playgrounds are persisted as sessions.
//!
//! # Lock order
//!
//! A reconcile playground is always locked before any live playground that
//! shares it, and live playgrounds are locked in ascending id order.
//! [`PlaygroundRegistry::lock_group`] is the only multi-playground entry
//! point.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::application::ports::{LiveAccount, PlaygroundSession, StoreError, StorePort};
use crate::domain::playground::{LiveSource, Meta, Playground, PlaygroundResolver};
use crate::domain::shared::PlaygroundId;
use crate::error::EngineError;

/// A registered playground.
#[derive(Debug, Clone)]
struct PlaygroundHandle {
    meta: Meta,
    playground: Arc<Mutex<Playground>>,
}

/// In-memory index of playgrounds and live accounts.
#[derive(Debug, Default)]
pub struct PlaygroundRegistry {
    playgrounds: RwLock<HashMap<PlaygroundId, PlaygroundHandle>>,
    live_accounts: RwLock<HashMap<LiveSource, LiveAccount>>,
    persisted: RwLock<HashSet<PlaygroundId>>,
}

impl PlaygroundRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a playground.
    pub fn insert(&self, playground: Playground, persisted: bool) {
        let id = playground.id().clone();
        let handle = PlaygroundHandle {
            meta: playground.meta().clone(),
            playground: Arc::new(Mutex::new(playground)),
        };
        if persisted {
            self.persisted.write().insert(id.clone());
        }
        self.playgrounds.write().insert(id, handle);
    }

    /// Returns true if the playground is registered.
    #[must_use]
    pub fn contains(&self, id: &PlaygroundId) -> bool {
        self.playgrounds.read().contains_key(id)
    }

    /// Number of registered playgrounds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.playgrounds.read().len()
    }

    /// Returns true if no playground is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.playgrounds.read().is_empty()
    }

    /// Metadata of a registered playground, readable without its lock.
    pub fn meta(&self, id: &PlaygroundId) -> Result<Meta, EngineError> {
        self.playgrounds
            .read()
            .get(id)
            .map(|h| h.meta.clone())
            .ok_or_else(|| not_found(id))
    }

    /// Returns true if the playground is persisted as a session.
    #[must_use]
    pub fn is_persisted(&self, id: &PlaygroundId) -> bool {
        self.persisted.read().contains(id)
    }

    fn handle(&self, id: &PlaygroundId) -> Result<Arc<Mutex<Playground>>, EngineError> {
        self.playgrounds
            .read()
            .get(id)
            .map(|h| Arc::clone(&h.playground))
            .ok_or_else(|| not_found(id))
    }

    // ========================================================================
    // Live accounts
    // ========================================================================

    /// Live account for a broker source.
    #[must_use]
    pub fn live_account(&self, source: &LiveSource) -> Option<LiveAccount> {
        self.live_accounts.read().get(source).cloned()
    }

    /// Insert or replace a live account.
    pub fn upsert_live_account(&self, account: LiveAccount) {
        self.live_accounts
            .write()
            .insert(account.source.clone(), account);
    }

    /// Attach a live playground to its account and return the updated account.
    pub fn attach_live_playground(
        &self,
        source: &LiveSource,
        playground_id: PlaygroundId,
    ) -> Result<LiveAccount, EngineError> {
        let mut accounts = self.live_accounts.write();
        let account = accounts.get_mut(source).ok_or_else(|| {
            EngineError::not_found(format!("live account {source} not found"))
        })?;
        if !account.live_playground_ids.contains(&playground_id) {
            account.live_playground_ids.push(playground_id);
        }
        Ok(account.clone())
    }

    /// Every live account.
    #[must_use]
    pub fn live_accounts(&self) -> Vec<LiveAccount> {
        let mut accounts: Vec<_> = self.live_accounts.read().values().cloned().collect();
        accounts.sort_by(|a, b| a.source.cmp(&b.source));
        accounts
    }

    // ========================================================================
    // Locking
    // ========================================================================

    /// Lock a single playground.
    pub async fn lock(&self, id: &PlaygroundId) -> Result<LockedPlaygrounds, EngineError> {
        let handle = self.handle(id)?;
        let mut locked = LockedPlaygrounds::default();
        locked.guards.push((id.clone(), handle.lock_owned().await));
        Ok(locked)
    }

    /// Lock a reconcile playground, then `live_ids` in ascending order.
    pub async fn lock_group(
        &self,
        reconcile_id: &PlaygroundId,
        live_ids: &[PlaygroundId],
    ) -> Result<LockedPlaygrounds, EngineError> {
        let mut locked = self.lock(reconcile_id).await?;
        locked.extend(self, live_ids).await?;
        Ok(locked)
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write a playground through to the store: as a session when persisted,
    /// otherwise as an in-memory copy.
    pub async fn persist<S: StorePort + ?Sized>(
        &self,
        store: &S,
        playground: &Playground,
    ) -> Result<Option<PlaygroundSession>, StoreError> {
        let snapshot = playground.snapshot();
        if self.is_persisted(playground.id()) {
            store.update_playground_session(&snapshot).await.map(Some)
        } else {
            store.save_in_memory_playground(&snapshot).await.map(|()| None)
        }
    }
}

fn not_found(id: &PlaygroundId) -> EngineError {
    EngineError::not_found(format!("playground {id} not found")).with_context("playground_id", id)
}

/// Playgrounds held under their locks, in acquisition order.
#[derive(Default)]
pub struct LockedPlaygrounds {
    guards: Vec<(PlaygroundId, OwnedMutexGuard<Playground>)>,
}

impl LockedPlaygrounds {
    /// Lock more playgrounds, ascending, skipping ones already held.
    ///
    /// Only call this while holding the reconcile playground or nothing that
    /// sorts after the new ids.
    pub async fn extend(
        &mut self,
        registry: &PlaygroundRegistry,
        ids: &[PlaygroundId],
    ) -> Result<(), EngineError> {
        let mut ids: Vec<&PlaygroundId> = ids.iter().filter(|id| !self.holds(id)).collect();
        ids.sort();
        ids.dedup();
        for id in ids {
            let handle = registry.handle(id)?;
            self.guards.push((id.clone(), handle.lock_owned().await));
        }
        Ok(())
    }

    /// Like [`Self::extend`], but ids the registry does not know are skipped
    /// and returned instead of failing the whole lock.
    pub async fn extend_registered(
        &mut self,
        registry: &PlaygroundRegistry,
        ids: &[PlaygroundId],
    ) -> Vec<PlaygroundId> {
        let mut ids: Vec<&PlaygroundId> = ids.iter().filter(|id| !self.holds(id)).collect();
        ids.sort();
        ids.dedup();
        let mut missing = Vec::new();
        for id in ids {
            match registry.handle(id) {
                Ok(handle) => self.guards.push((id.clone(), handle.lock_owned().await)),
                Err(_) => missing.push(id.clone()),
            }
        }
        missing
    }

    /// Returns true if the playground is held.
    #[must_use]
    pub fn holds(&self, id: &PlaygroundId) -> bool {
        self.guards.iter().any(|(held, _)| held == id)
    }

    /// Read a held playground.
    pub fn get(&self, id: &PlaygroundId) -> Result<&Playground, EngineError> {
        self.guards
            .iter()
            .find(|(held, _)| held == id)
            .map(|(_, guard)| &**guard)
            .ok_or_else(|| not_found(id))
    }

    /// Mutate a held playground.
    pub fn get_mut(&mut self, id: &PlaygroundId) -> Result<&mut Playground, EngineError> {
        self.guards
            .iter_mut()
            .find(|(held, _)| held == id)
            .map(|(_, guard)| &mut **guard)
            .ok_or_else(|| not_found(id))
    }

    /// Held playgrounds in acquisition order.
    pub fn iter(&self) -> impl Iterator<Item = &Playground> {
        self.guards.iter().map(|(_, guard)| &**guard)
    }
}

impl PlaygroundResolver for LockedPlaygrounds {
    fn resolve(&mut self, id: &PlaygroundId) -> Option<&mut Playground> {
        self.guards
            .iter_mut()
            .find(|(held, _)| held == id)
            .map(|(_, guard)| &mut **guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::Clock;
    use crate::domain::playground::Environment;
    use crate::domain::shared::LiveAccountType;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn source() -> LiveSource {
        LiveSource {
            broker: "mock".to_string(),
            account_id: "acct-1".to_string(),
            account_type: LiveAccountType::Mock,
        }
    }

    fn reconcile(id: &str) -> Playground {
        let start = Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap();
        let meta = Meta {
            environment: Environment::Reconcile,
            start_at: start,
            end_at: None,
            starting_balance: dec!(1000),
            source: Some(source()),
            reconcile_playground_id: None,
            client_id: None,
            tags: Vec::new(),
        };
        let clock = Clock::new(start, None, None).unwrap();
        Playground::new(PlaygroundId::new(id), meta, clock, Vec::new(), 16).unwrap()
    }

    #[tokio::test]
    async fn lock_unknown_playground_is_not_found() {
        let registry = PlaygroundRegistry::new();
        let err = registry.lock(&PlaygroundId::new("nope")).await.err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn group_locks_reconcile_first_then_ascending() {
        let registry = PlaygroundRegistry::new();
        for id in ["r", "b", "a", "c"] {
            registry.insert(reconcile(id), false);
        }

        let live = [
            PlaygroundId::new("c"),
            PlaygroundId::new("a"),
            PlaygroundId::new("b"),
            PlaygroundId::new("a"),
        ];
        let locked = registry
            .lock_group(&PlaygroundId::new("r"), &live)
            .await
            .unwrap();

        let order: Vec<&str> = locked.iter().map(|p| p.id().as_str()).collect();
        assert_eq!(order, vec!["r", "a", "b", "c"]);
    }

    #[test]
    fn live_accounts_are_listed_by_source() {
        let registry = PlaygroundRegistry::new();
        for account_type in [LiveAccountType::Paper, LiveAccountType::Margin] {
            registry.upsert_live_account(LiveAccount {
                source: LiveSource {
                    account_type,
                    ..source()
                },
                reconcile_playground_id: PlaygroundId::new(account_type.as_str()),
                live_playground_ids: Vec::new(),
                starting_equity: dec!(1000),
                created_at: Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap(),
            });
        }

        let types: Vec<_> = registry
            .live_accounts()
            .iter()
            .map(|a| a.source.account_type)
            .collect();
        assert_eq!(types, vec![LiveAccountType::Margin, LiveAccountType::Paper]);
    }

    #[tokio::test]
    async fn extend_registered_skips_unknown_ids() {
        let registry = PlaygroundRegistry::new();
        registry.insert(reconcile("r"), false);
        registry.insert(reconcile("b"), false);

        let mut locked = registry.lock(&PlaygroundId::new("r")).await.unwrap();
        let missing = locked
            .extend_registered(&registry, &[PlaygroundId::new("gone"), PlaygroundId::new("b")])
            .await;

        assert_eq!(missing, vec![PlaygroundId::new("gone")]);
        let order: Vec<&str> = locked.iter().map(|p| p.id().as_str()).collect();
        assert_eq!(order, vec!["r", "b"]);
    }

    #[tokio::test]
    async fn resolver_finds_only_held_playgrounds() {
        let registry = PlaygroundRegistry::new();
        registry.insert(reconcile("r"), false);
        registry.insert(reconcile("other"), false);

        let mut locked = registry.lock(&PlaygroundId::new("r")).await.unwrap();
        assert!(locked.resolve(&PlaygroundId::new("r")).is_some());
        assert!(locked.resolve(&PlaygroundId::new("other")).is_none());
    }

    #[test]
    fn attach_live_playground_is_idempotent() {
        let registry = PlaygroundRegistry::new();
        registry.upsert_live_account(LiveAccount {
            source: source(),
            reconcile_playground_id: PlaygroundId::new("r"),
            live_playground_ids: Vec::new(),
            starting_equity: dec!(1000),
            created_at: Utc.with_ymd_and_hms(2024, 1, 2, 14, 30, 0).unwrap(),
        });

        registry
            .attach_live_playground(&source(), PlaygroundId::new("l1"))
            .unwrap();
        let account = registry
            .attach_live_playground(&source(), PlaygroundId::new("l1"))
            .unwrap();
        assert_eq!(account.live_playground_ids, vec![PlaygroundId::new("l1")]);
    }
}
