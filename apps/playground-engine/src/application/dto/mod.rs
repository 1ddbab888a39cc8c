//! Data Transfer Objects (DTOs)
//!
//! DTOs are the engine's request and response shapes.

mod envelope;
mod market_dto;
mod order_dto;
mod playground_dto;

pub use envelope::{EngineRequest, EngineResponse};
pub use market_dto::{
    AppendBarsRequestDto, AppendBarsResponseDto, GetAccountRequestDto, GetCandlesRequestDto,
    GetCandlesResponseDto, NextTickRequestDto,
};
pub use order_dto::{
    CancelOrderRequestDto, CancelOrderResponseDto, PlaceOrderRequestDto, PlaceOrderResponseDto,
};
pub use playground_dto::{
    AccountRequestDto, BackfillOrderDto, ClockRequestDto, CreatePlaygroundRequestDto,
    CreatePlaygroundResponseDto, RepositoryRequestDto,
};
