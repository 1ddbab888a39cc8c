//! Hydrate Use Case
//!
//! Rebuilds the registry from the store at startup: persisted playground
//! sessions first, then live accounts and any reconcile playground they
//! need that was only kept in memory.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::application::EngineSettings;
use crate::application::ports::StorePort;
use crate::application::services::{LiveFeedRegistry, PlaygroundRegistry};
use crate::domain::playground::{Environment, Playground};
use crate::error::EngineError;

/// What hydration loaded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HydrateReport {
    /// Playgrounds registered.
    pub playgrounds: usize,
    /// Live accounts registered.
    pub live_accounts: usize,
}

/// Use case for loading persisted state into the registry.
pub struct HydrateUseCase<S>
where
    S: StorePort,
{
    store: Arc<S>,
    registry: Arc<PlaygroundRegistry>,
    feeds: Arc<LiveFeedRegistry>,
    settings: EngineSettings,
}

impl<S> HydrateUseCase<S>
where
    S: StorePort,
{
    /// Create a new HydrateUseCase.
    pub fn new(
        store: Arc<S>,
        registry: Arc<PlaygroundRegistry>,
        feeds: Arc<LiveFeedRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            store,
            registry,
            feeds,
            settings,
        }
    }

    /// Execute the use case. Playgrounds already registered are left alone.
    pub async fn execute(&self) -> Result<HydrateReport, EngineError> {
        let mut report = HydrateReport::default();

        for snapshot in self.store.load_playgrounds().await? {
            if self.registry.contains(&snapshot.id) {
                continue;
            }
            let playground = Playground::restore(snapshot, self.settings.queue_capacity)?;
            self.register(playground, true);
            report.playgrounds += 1;
        }

        for account in self.store.load_live_accounts().await? {
            let reconcile_id = &account.reconcile_playground_id;
            if !self.registry.contains(reconcile_id) {
                let Some(snapshot) = self.store.fetch_playground(reconcile_id).await? else {
                    tracing::warn!(
                        source = %account.source,
                        playground_id = %reconcile_id,
                        "Live account without a stored reconcile playground, skipping"
                    );
                    continue;
                };
                let playground = Playground::restore(snapshot, self.settings.queue_capacity)?;
                self.register(playground, false);
                report.playgrounds += 1;
            }
            self.registry.upsert_live_account(account);
            report.live_accounts += 1;
        }

        tracing::info!(
            playgrounds = report.playgrounds,
            live_accounts = report.live_accounts,
            "Registry hydrated"
        );
        Ok(report)
    }

    fn register(&self, playground: Playground, persisted: bool) {
        if playground.environment() == Environment::Live {
            for repository in playground.repositories() {
                self.feeds
                    .subscribe(playground.id(), repository, playground.new_candles_queue());
            }
        }
        self.registry.insert(playground, persisted);
    }
}
