//! Read-only playground queries and live bar ingestion.

use std::sync::Arc;

use crate::application::dto::{
    AppendBarsRequestDto, AppendBarsResponseDto, GetAccountRequestDto, GetCandlesRequestDto,
    GetCandlesResponseDto,
};
use crate::application::services::{LiveFeedRegistry, PlaygroundRegistry};
use crate::domain::market::Period;
use crate::domain::playground::AccountSnapshot;
use crate::error::EngineError;

/// Use case for reading a playground's account.
pub struct GetAccountUseCase {
    registry: Arc<PlaygroundRegistry>,
}

impl GetAccountUseCase {
    /// Create a new GetAccountUseCase.
    pub const fn new(registry: Arc<PlaygroundRegistry>) -> Self {
        Self { registry }
    }

    /// Execute the use case.
    pub async fn execute(&self, request: GetAccountRequestDto) -> Result<AccountSnapshot, EngineError> {
        let locked = self.registry.lock(&request.playground_id).await?;
        Ok(locked.get(&request.playground_id)?.account(&request.filter))
    }
}

/// Use case for reading a range of a playground's candles.
pub struct GetCandlesUseCase {
    registry: Arc<PlaygroundRegistry>,
}

impl GetCandlesUseCase {
    /// Create a new GetCandlesUseCase.
    pub const fn new(registry: Arc<PlaygroundRegistry>) -> Self {
        Self { registry }
    }

    /// Execute the use case.
    pub async fn execute(&self, request: GetCandlesRequestDto) -> Result<GetCandlesResponseDto, EngineError> {
        let period = Period::from_seconds(request.period_in_seconds)?;
        let locked = self.registry.lock(&request.playground_id).await?;
        let candles = locked.get(&request.playground_id)?.fetch_candles(
            &request.symbol,
            period,
            request.from,
            request.to,
        )?;
        Ok(GetCandlesResponseDto {
            symbol: request.symbol,
            period_in_seconds: request.period_in_seconds,
            candles,
        })
    }
}

/// Use case for appending bars to a live feed.
pub struct AppendBarsUseCase {
    feeds: Arc<LiveFeedRegistry>,
}

impl AppendBarsUseCase {
    /// Create a new AppendBarsUseCase.
    pub const fn new(feeds: Arc<LiveFeedRegistry>) -> Self {
        Self { feeds }
    }

    /// Execute the use case.
    pub fn execute(&self, request: AppendBarsRequestDto) -> Result<AppendBarsResponseDto, EngineError> {
        let period = Period::from_seconds(request.period_in_seconds)?;
        let (appended, subscribers) = self.feeds.append_bars(&request.symbol, period, request.bars)?;
        tracing::debug!(
            symbol = %request.symbol,
            period_in_seconds = request.period_in_seconds,
            appended,
            subscribers,
            "Bars appended"
        );
        Ok(AppendBarsResponseDto {
            appended,
            subscribers,
        })
    }
}
