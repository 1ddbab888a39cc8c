//! Create Playground Use Case

use std::sync::Arc;

use chrono::{DateTime, Days, Utc};

use crate::application::EngineSettings;
use crate::application::dto::{
    BackfillOrderDto, CreatePlaygroundRequestDto, CreatePlaygroundResponseDto, RepositoryRequestDto,
};
use crate::application::ports::{BrokerError, BrokerPort, LiveAccount, PlaygroundSession, StoreError, StorePort};
use crate::application::services::{LiveFeedRegistry, PlaygroundRegistry, with_timeout};
use crate::domain::market::{CandleRepository, Clock, Period};
use crate::domain::playground::{Environment, LiveSource, Meta, OrderFilter, Playground, PlaygroundError};
use crate::domain::shared::PlaygroundId;
use crate::error::EngineError;

/// Calendar days past the stop date covered by a simulator calendar, so the
/// clock can always find the next session.
const CALENDAR_MARGIN_DAYS: u64 = 7;

/// Use case for creating simulator and live playgrounds.
///
/// The first live playground on a broker account bootstraps the account's
/// reconcile playground from the broker's equity.
pub struct CreatePlaygroundUseCase<B, S>
where
    B: BrokerPort,
    S: StorePort,
{
    broker: Arc<B>,
    store: Arc<S>,
    registry: Arc<PlaygroundRegistry>,
    feeds: Arc<LiveFeedRegistry>,
    settings: EngineSettings,
}

impl<B, S> CreatePlaygroundUseCase<B, S>
where
    B: BrokerPort,
    S: StorePort,
{
    /// Create a new CreatePlaygroundUseCase.
    pub fn new(
        broker: Arc<B>,
        store: Arc<S>,
        registry: Arc<PlaygroundRegistry>,
        feeds: Arc<LiveFeedRegistry>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            broker,
            store,
            registry,
            feeds,
            settings,
        }
    }

    /// Execute the use case.
    pub async fn execute(
        &self,
        request: CreatePlaygroundRequestDto,
    ) -> Result<CreatePlaygroundResponseDto, EngineError> {
        let mut playground = match request.env {
            Environment::Simulator => self.build_simulator(&request)?,
            Environment::Live => self.build_live(&request).await?,
            Environment::Reconcile => {
                return Err(EngineError::validation(
                    "reconcile playgrounds are created with their live account",
                ));
            }
        };

        for (index, backfill) in request.backfill_orders.iter().enumerate() {
            backfill_one(&mut playground, backfill)
                .map_err(|e| e.with_context("backfill_index", index))?;
        }

        let playground_id = playground.id().clone();
        let session = self.save(&playground, request.save_to_db).await?;
        let account = playground.account(&OrderFilter {
            fetch_orders: !request.backfill_orders.is_empty(),
            ..OrderFilter::default()
        });

        if request.env == Environment::Live {
            for repository in playground.repositories() {
                self.feeds
                    .subscribe(&playground_id, repository, playground.new_candles_queue());
            }
            if let Some(source) = &playground.meta().source {
                let account = self.registry.attach_live_playground(source, playground_id.clone())?;
                self.store.save_live_account(&account, true).await?;
            }
        }

        tracing::info!(
            playground_id = %playground_id,
            environment = %request.env,
            backfilled = request.backfill_orders.len(),
            persisted = request.save_to_db,
            "Playground created"
        );

        self.registry.insert(playground, request.save_to_db);

        Ok(CreatePlaygroundResponseDto {
            playground_id,
            account,
            playground_session: session,
        })
    }

    fn build_simulator(&self, request: &CreatePlaygroundRequestDto) -> Result<Playground, EngineError> {
        let start = request.clock.start_date;
        let stop = request
            .clock
            .stop_date
            .ok_or_else(|| EngineError::validation("simulator playgrounds need a stop date"))?;
        if start >= stop {
            return Err(EngineError::validation("start date must be before stop date"));
        }

        let calendar = match &self.settings.calendar {
            Some(settings) => {
                let to = stop
                    .date_naive()
                    .checked_add_days(Days::new(CALENDAR_MARGIN_DAYS))
                    .unwrap_or_else(|| stop.date_naive());
                Some(settings.calendar(start.date_naive(), to)?)
            }
            None => None,
        };
        let clock = Clock::new(start, Some(stop), calendar).map_err(PlaygroundError::from)?;

        let meta = Meta {
            environment: Environment::Simulator,
            start_at: start,
            end_at: Some(stop),
            starting_balance: request.account.balance,
            source: None,
            reconcile_playground_id: None,
            client_id: request.client_id.clone(),
            tags: request.tags.clone(),
        };
        let repositories = build_repositories(&request.repositories, clock.current_time())?;

        Ok(Playground::new(
            PlaygroundId::generate(),
            meta,
            clock,
            repositories,
            self.settings.queue_capacity,
        )?)
    }

    async fn build_live(&self, request: &CreatePlaygroundRequestDto) -> Result<Playground, EngineError> {
        let source = request
            .account
            .source
            .clone()
            .ok_or_else(|| EngineError::validation("live playgrounds need a source account"))?;
        if source.broker != self.broker.name() {
            return Err(EngineError::validation(format!(
                "unknown broker '{}', this engine routes to '{}'",
                source.broker,
                self.broker.name()
            )));
        }

        let account = match self.registry.live_account(&source) {
            Some(account) => account,
            None => self.bootstrap_account(&source, request.clock.start_date).await?,
        };

        let start = request.clock.start_date;
        let clock = Clock::new(start, None, None).map_err(PlaygroundError::from)?;
        let meta = Meta {
            environment: Environment::Live,
            start_at: start,
            end_at: None,
            starting_balance: request.account.balance,
            source: Some(source),
            reconcile_playground_id: Some(account.reconcile_playground_id),
            client_id: request.client_id.clone(),
            tags: request.tags.clone(),
        };
        let repositories = build_repositories(&request.repositories, start)?;

        Ok(Playground::new(
            PlaygroundId::generate(),
            meta,
            clock,
            repositories,
            self.settings.queue_capacity,
        )?)
    }

    /// Create the reconcile playground for a broker account seen for the
    /// first time, funded with the broker's equity.
    async fn bootstrap_account(
        &self,
        source: &LiveSource,
        start: DateTime<Utc>,
    ) -> Result<LiveAccount, EngineError> {
        if let Some(stored) = self.store.fetch_live_account(source).await? {
            if !self.registry.contains(&stored.reconcile_playground_id) {
                let snapshot = self
                    .store
                    .fetch_playground(&stored.reconcile_playground_id)
                    .await?
                    .ok_or_else(|| StoreError::PlaygroundNotFound(stored.reconcile_playground_id.clone()))?;
                let reconcile = Playground::restore(snapshot, self.settings.queue_capacity)?;
                self.registry.insert(reconcile, true);
            }
            self.registry.upsert_live_account(stored.clone());
            return Ok(stored);
        }

        let equity = with_timeout(self.settings.broker_timeout, self.broker.fetch_equity()).await?;
        if !equity.account_type.is_supported() {
            return Err(BrokerError::UnsupportedAccountType {
                account_type: equity.account_type.to_string(),
            }
            .into());
        }

        let meta = Meta {
            environment: Environment::Reconcile,
            start_at: start,
            end_at: None,
            starting_balance: equity.equity,
            source: Some(source.clone()),
            reconcile_playground_id: None,
            client_id: None,
            tags: Vec::new(),
        };
        let clock = Clock::new(start, None, None).map_err(PlaygroundError::from)?;
        let reconcile = Playground::new(
            PlaygroundId::generate(),
            meta,
            clock,
            Vec::new(),
            self.settings.queue_capacity,
        )?;

        let account = LiveAccount {
            source: source.clone(),
            reconcile_playground_id: reconcile.id().clone(),
            live_playground_ids: Vec::new(),
            starting_equity: equity.equity,
            created_at: Utc::now(),
        };

        match self.store.save_live_account(&account, false).await {
            Ok(()) => {}
            Err(StoreError::DuplicateLiveAccount(_)) => {
                if let Some(existing) = self.registry.live_account(source) {
                    return Ok(existing);
                }
                return Err(EngineError::conflict(format!(
                    "live account {source} is being created concurrently"
                )));
            }
            Err(e) => return Err(e.into()),
        }

        self.store.save_playground_session(&reconcile.snapshot()).await?;
        tracing::info!(
            source = %source,
            playground_id = %reconcile.id(),
            equity = %equity.equity,
            account_type = %equity.account_type,
            "Reconcile playground bootstrapped"
        );
        self.registry.insert(reconcile, true);
        self.registry.upsert_live_account(account.clone());
        Ok(account)
    }

    async fn save(
        &self,
        playground: &Playground,
        save_to_db: bool,
    ) -> Result<Option<PlaygroundSession>, StoreError> {
        let snapshot = playground.snapshot();
        if save_to_db {
            self.store.save_playground_session(&snapshot).await.map(Some)
        } else {
            self.store.save_in_memory_playground(&snapshot).await.map(|()| None)
        }
    }
}

fn build_repositories(
    requests: &[RepositoryRequestDto],
    start_at: DateTime<Utc>,
) -> Result<Vec<CandleRepository>, EngineError> {
    requests
        .iter()
        .map(|r| {
            let period = Period::from_seconds(r.period_in_seconds)?;
            Ok(CandleRepository::new(
                r.symbol.clone(),
                period,
                r.bars.clone(),
                r.indicators.clone(),
                start_at,
                r.history_in_days,
            )?)
        })
        .collect()
}

fn backfill_one(playground: &mut Playground, backfill: &BackfillOrderDto) -> Result<(), EngineError> {
    let trade = playground.backfill_order(backfill.order.clone(), backfill.price, backfill.time)?;
    tracing::debug!(
        playground_id = %playground.id(),
        order_id = %trade.order_id(),
        quantity = %trade.quantity(),
        price = %trade.price(),
        "Backfilled order"
    );
    Ok(())
}
