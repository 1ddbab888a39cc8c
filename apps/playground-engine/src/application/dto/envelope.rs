//! Request and response envelopes read and written by the driver, one JSON
//! object per line.

use serde::{Deserialize, Serialize};

use super::market_dto::{
    AppendBarsRequestDto, AppendBarsResponseDto, GetAccountRequestDto, GetCandlesRequestDto,
    GetCandlesResponseDto, NextTickRequestDto,
};
use super::order_dto::{
    CancelOrderRequestDto, CancelOrderResponseDto, PlaceOrderRequestDto, PlaceOrderResponseDto,
};
use super::playground_dto::{CreatePlaygroundRequestDto, CreatePlaygroundResponseDto};
use crate::domain::playground::{AccountSnapshot, TickDelta};
use crate::error::ErrorResponse;

/// Any request the engine accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineRequest {
    /// Create a playground.
    CreatePlayground(CreatePlaygroundRequestDto),
    /// Place an order.
    PlaceOrder(PlaceOrderRequestDto),
    /// Advance a playground.
    NextTick(NextTickRequestDto),
    /// Read an account.
    GetAccount(GetAccountRequestDto),
    /// Read bars.
    GetCandles(GetCandlesRequestDto),
    /// Cancel an order.
    CancelOrder(CancelOrderRequestDto),
    /// Push live bars.
    AppendBars(AppendBarsRequestDto),
}

impl EngineRequest {
    /// Request name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreatePlayground(_) => "CreatePlayground",
            Self::PlaceOrder(_) => "PlaceOrder",
            Self::NextTick(_) => "NextTick",
            Self::GetAccount(_) => "GetAccount",
            Self::GetCandles(_) => "GetCandles",
            Self::CancelOrder(_) => "CancelOrder",
            Self::AppendBars(_) => "AppendBars",
        }
    }
}

/// Any response the engine writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EngineResponse {
    /// Playground created.
    PlaygroundCreated(CreatePlaygroundResponseDto),
    /// Order placed.
    OrderPlaced(PlaceOrderResponseDto),
    /// Tick result.
    Tick(TickDelta),
    /// Account snapshot.
    Account(AccountSnapshot),
    /// Bars.
    Candles(GetCandlesResponseDto),
    /// Order canceled.
    OrderCanceled(CancelOrderResponseDto),
    /// Bars appended.
    BarsAppended(AppendBarsResponseDto),
    /// The request failed.
    Error(ErrorResponse),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_order_request_parses_flat_fields() {
        let line = r#"{"type":"PlaceOrder","playground_id":"p-1","symbol":"AAPL","class":"equity","quantity":"2","side":"buy","order_type":"market","duration":"day","tag":""}"#;
        let request: EngineRequest = serde_json::from_str(line).unwrap();
        assert_eq!(request.name(), "PlaceOrder");
        let EngineRequest::PlaceOrder(dto) = request else {
            panic!("wrong variant");
        };
        assert_eq!(dto.playground_id.as_str(), "p-1");
        assert_eq!(dto.order.symbol.ticker(), "AAPL");
        assert_eq!(dto.perform_checks, None);
    }

    #[test]
    fn unknown_request_type_fails() {
        let line = r#"{"type":"Liquidate","playground_id":"p-1"}"#;
        assert!(serde_json::from_str::<EngineRequest>(line).is_err());
    }

    #[test]
    fn get_account_filter_defaults() {
        let line = r#"{"type":"GetAccount","playground_id":"p-1"}"#;
        let EngineRequest::GetAccount(dto) = serde_json::from_str(line).unwrap() else {
            panic!("wrong variant");
        };
        assert!(!dto.filter.fetch_orders);
        assert!(dto.filter.status.is_empty());
    }
}
