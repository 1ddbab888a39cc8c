//! Dependency Injection Container
//!
//! Wires the broker, the store, and the shared registries into use cases,
//! and dispatches driver requests to them.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::application::EngineSettings;
use crate::application::dto::{EngineRequest, EngineResponse};
use crate::application::ports::{BrokerPort, StorePort};
use crate::application::services::{LiveFeedRegistry, PlaygroundRegistry, Reconciler};
use crate::application::use_cases::{
    AppendBarsUseCase, CancelOrderUseCase, CreatePlaygroundUseCase, GetAccountUseCase,
    GetCandlesUseCase, HydrateReport, HydrateUseCase, NextTickUseCase, PlaceOrderUseCase,
};
use crate::error::EngineError;
use crate::observability::record_request;

/// Dependency injection container.
pub struct Container<B, S>
where
    B: BrokerPort + 'static,
    S: StorePort + 'static,
{
    // Ports
    broker: Arc<B>,
    store: Arc<S>,

    // Shared state
    registry: Arc<PlaygroundRegistry>,
    feeds: Arc<LiveFeedRegistry>,
    reconciler: Arc<Reconciler<B, S>>,
    settings: EngineSettings,
}

impl<B, S> Container<B, S>
where
    B: BrokerPort + 'static,
    S: StorePort + 'static,
{
    /// Create a new container with empty registries.
    pub fn new(broker: Arc<B>, store: Arc<S>, settings: EngineSettings) -> Self {
        let registry = Arc::new(PlaygroundRegistry::new());
        let reconciler = Arc::new(Reconciler::new(
            Arc::clone(&broker),
            Arc::clone(&store),
            Arc::clone(&registry),
            settings.clone(),
        ));
        Self {
            broker,
            store,
            registry,
            feeds: Arc::new(LiveFeedRegistry::new()),
            reconciler,
            settings,
        }
    }

    /// Get the broker port.
    pub fn broker(&self) -> Arc<B> {
        Arc::clone(&self.broker)
    }

    /// Get the store port.
    pub fn store(&self) -> Arc<S> {
        Arc::clone(&self.store)
    }

    /// Get the playground registry.
    pub fn registry(&self) -> Arc<PlaygroundRegistry> {
        Arc::clone(&self.registry)
    }

    /// Get the live feed registry.
    pub fn feeds(&self) -> Arc<LiveFeedRegistry> {
        Arc::clone(&self.feeds)
    }

    /// Get the reconciler.
    pub fn reconciler(&self) -> Arc<Reconciler<B, S>> {
        Arc::clone(&self.reconciler)
    }

    /// Engine settings.
    pub const fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    // ========================================================================
    // Use cases
    // ========================================================================

    /// Create a `CreatePlaygroundUseCase`.
    pub fn create_playground_use_case(&self) -> CreatePlaygroundUseCase<B, S> {
        CreatePlaygroundUseCase::new(
            Arc::clone(&self.broker),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.feeds),
            self.settings.clone(),
        )
    }

    /// Create a `PlaceOrderUseCase`.
    pub fn place_order_use_case(&self) -> PlaceOrderUseCase<B, S> {
        PlaceOrderUseCase::new(
            Arc::clone(&self.broker),
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            self.settings.clone(),
        )
    }

    /// Create a `NextTickUseCase`.
    pub fn next_tick_use_case(&self) -> NextTickUseCase<S> {
        NextTickUseCase::new(Arc::clone(&self.store), Arc::clone(&self.registry))
    }

    /// Create a `CancelOrderUseCase`.
    pub fn cancel_order_use_case(&self) -> CancelOrderUseCase<S> {
        CancelOrderUseCase::new(Arc::clone(&self.store), Arc::clone(&self.registry))
    }

    /// Create a `GetAccountUseCase`.
    pub fn get_account_use_case(&self) -> GetAccountUseCase {
        GetAccountUseCase::new(Arc::clone(&self.registry))
    }

    /// Create a `GetCandlesUseCase`.
    pub fn get_candles_use_case(&self) -> GetCandlesUseCase {
        GetCandlesUseCase::new(Arc::clone(&self.registry))
    }

    /// Create an `AppendBarsUseCase`.
    pub fn append_bars_use_case(&self) -> AppendBarsUseCase {
        AppendBarsUseCase::new(Arc::clone(&self.feeds))
    }

    /// Create a `HydrateUseCase`.
    pub fn hydrate_use_case(&self) -> HydrateUseCase<S> {
        HydrateUseCase::new(
            Arc::clone(&self.store),
            Arc::clone(&self.registry),
            Arc::clone(&self.feeds),
            self.settings.clone(),
        )
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Load persisted playgrounds and live accounts.
    pub async fn hydrate(&self) -> Result<HydrateReport, EngineError> {
        self.hydrate_use_case().execute().await
    }

    /// Start the reconciler loop.
    pub fn spawn_reconciler(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        Arc::clone(&self.reconciler).spawn(shutdown)
    }

    /// Dispatch one request.
    pub async fn handle(&self, request: EngineRequest) -> Result<EngineResponse, EngineError> {
        let name = request.name();
        let result = match request {
            EngineRequest::CreatePlayground(dto) => self
                .create_playground_use_case()
                .execute(dto)
                .await
                .map(EngineResponse::PlaygroundCreated),
            EngineRequest::PlaceOrder(dto) => self
                .place_order_use_case()
                .execute(dto)
                .await
                .map(EngineResponse::OrderPlaced),
            EngineRequest::NextTick(dto) => self
                .next_tick_use_case()
                .execute(dto)
                .await
                .map(EngineResponse::Tick),
            EngineRequest::GetAccount(dto) => self
                .get_account_use_case()
                .execute(dto)
                .await
                .map(EngineResponse::Account),
            EngineRequest::GetCandles(dto) => self
                .get_candles_use_case()
                .execute(dto)
                .await
                .map(EngineResponse::Candles),
            EngineRequest::CancelOrder(dto) => self
                .cancel_order_use_case()
                .execute(dto)
                .await
                .map(EngineResponse::OrderCanceled),
            EngineRequest::AppendBars(dto) => self
                .append_bars_use_case()
                .execute(dto)
                .map(EngineResponse::BarsAppended),
        };

        match &result {
            Ok(_) => record_request(name, "ok"),
            Err(e) => {
                record_request(name, e.kind().as_str());
                tracing::warn!(request = name, error = %e, "Request failed");
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::dto::GetAccountRequestDto;
    use crate::domain::playground::OrderFilter;
    use crate::domain::shared::PlaygroundId;
    use crate::error::ErrorKind;
    use crate::infrastructure::broker::MockBroker;
    use crate::infrastructure::persistence::InMemoryStore;

    fn container() -> Container<MockBroker, InMemoryStore> {
        Container::new(
            Arc::new(MockBroker::default()),
            Arc::new(InMemoryStore::new()),
            EngineSettings::default(),
        )
    }

    #[tokio::test]
    async fn unknown_playground_is_not_found() {
        let container = container();
        let err = container
            .handle(EngineRequest::GetAccount(GetAccountRequestDto {
                playground_id: PlaygroundId::new("missing"),
                filter: OrderFilter::default(),
            }))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn hydrate_empty_store() {
        let container = container();
        let report = container.hydrate().await.unwrap();
        assert_eq!(report, HydrateReport::default());
        assert!(container.registry().is_empty());
    }
}
