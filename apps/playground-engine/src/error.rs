//! Rich error handling for the playground engine.
//!
//! Every lower-level error converts into an [`EngineError`] here, and its
//! [`ErrorKind`] is decided once, in this module.
//!
//! | Kind | HTTP | Exit | Handling |
//! |------|------|------|----------|
//! | `Validation` | 400 | 2 | Returned to the caller |
//! | `NotFound` | 404 | 3 | Returned to the caller |
//! | `Conflict` | 409 | 1 | Returned to the caller |
//! | `TradingNotAllowed` | 423 | 1 | Reconciler drops the cache entry |
//! | `BrokerTransient` | 503 | 5 | Retried on the next poll |
//! | `BrokerFatal` | 502 | 5 | Logged; other orders continue |
//! | `Internal` | 500 | 1 | Logged; escalated when repeated |

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::application::ports::{BrokerError, StoreError};
use crate::config::ConfigError;
use crate::domain::market::{CalendarError, CandleError};
use crate::domain::order::OrderError;
use crate::domain::playground::PlaygroundError;

/// Error taxonomy shared by every layer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input.
    Validation,
    /// Playground, account, or order unknown.
    NotFound,
    /// Terminal-state transition, duplicate account, routed order.
    Conflict,
    /// Order or playground no longer accepts fills.
    TradingNotAllowed,
    /// Broker hiccup; retried.
    BrokerTransient,
    /// Broker answer the engine cannot use.
    BrokerFatal,
    /// Broken invariant.
    Internal,
}

impl ErrorKind {
    /// Process exit code for the driver binary.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Validation => 2,
            Self::NotFound => 3,
            Self::BrokerTransient | Self::BrokerFatal => 5,
            Self::Conflict | Self::TradingNotAllowed | Self::Internal => 1,
        }
    }

    /// HTTP status class for embedding transports.
    #[must_use]
    pub const fn http_status(&self) -> u16 {
        match self {
            Self::Validation => 400,
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::TradingNotAllowed => 423,
            Self::BrokerTransient => 503,
            Self::BrokerFatal => 502,
            Self::Internal => 500,
        }
    }

    /// Wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Conflict => "conflict",
            Self::TradingNotAllowed => "trading_not_allowed",
            Self::BrokerTransient => "broker_transient",
            Self::BrokerFatal => "broker_fatal",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified error with context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct EngineError {
    kind: ErrorKind,
    message: String,
    context: Vec<(String, String)>,
}

impl EngineError {
    /// Create a new engine error.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Add context to the error.
    #[must_use]
    pub fn with_context(mut self, key: impl Into<String>, value: impl fmt::Display) -> Self {
        self.context.push((key.into(), value.to_string()));
        self
    }

    /// Error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Context pairs, in the order they were added.
    #[must_use]
    pub fn context(&self) -> &[(String, String)] {
        &self.context
    }

    /// Response body for transports.
    #[must_use]
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            kind: self.kind,
            message: self.message.clone(),
            status: self.kind.http_status(),
            context: self.context.iter().cloned().collect(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

/// Serializable error body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error kind.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// HTTP status class.
    pub status: u16,
    /// Context pairs.
    pub context: std::collections::BTreeMap<String, String>,
}

/// Convenience constructors for common errors.
impl EngineError {
    /// Bad input.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Unknown entity.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Conflicting state.
    #[must_use]
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    /// Broken invariant.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<OrderError> for EngineError {
    fn from(err: OrderError) -> Self {
        let kind = match &err {
            OrderError::InvalidStateTransition { .. }
            | OrderError::NotOpenOrPending { .. }
            | OrderError::AlreadyFilled { .. } => ErrorKind::Conflict,
            _ => ErrorKind::Validation,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<CandleError> for EngineError {
    fn from(err: CandleError) -> Self {
        let kind = match &err {
            CandleError::RepositoryNotFound { .. } => ErrorKind::NotFound,
            CandleError::Queue(_) => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<CalendarError> for EngineError {
    fn from(err: CalendarError) -> Self {
        Self::validation(err.to_string())
    }
}

impl From<PlaygroundError> for EngineError {
    fn from(err: PlaygroundError) -> Self {
        match err {
            PlaygroundError::Order(inner) => inner.into(),
            PlaygroundError::Candle(inner) => inner.into(),
            PlaygroundError::InvalidMeta(_)
            | PlaygroundError::Clock(_)
            | PlaygroundError::NoPrice { .. }
            | PlaygroundError::InsufficientFreeMargin { .. }
            | PlaygroundError::SideNotAllowed { .. }
            | PlaygroundError::Unsupported { .. } => Self::validation(err.to_string()),
            PlaygroundError::PlaygroundNotFound(ref id) => {
                Self::not_found(err.to_string()).with_context("playground_id", id)
            }
            PlaygroundError::OrderNotFound {
                ref playground_id,
                ref order_id,
            } => Self::not_found(err.to_string())
                .with_context("playground_id", playground_id)
                .with_context("order_id", order_id),
            PlaygroundError::ExternalOrderNotFound {
                ref playground_id,
                ref external_id,
            } => Self::not_found(err.to_string())
                .with_context("playground_id", playground_id)
                .with_context("external_id", external_id),
            PlaygroundError::DuplicateOrder(_) | PlaygroundError::AlreadyRouted { .. } => {
                Self::conflict(err.to_string())
            }
            PlaygroundError::TradingNotAllowed { ref order_id, .. } => {
                Self::new(ErrorKind::TradingNotAllowed, err.to_string())
                    .with_context("order_id", order_id)
            }
            PlaygroundError::Queue(_) | PlaygroundError::MissingReconcileLink(_) => {
                Self::internal(err.to_string())
            }
        }
    }
}

impl From<BrokerError> for EngineError {
    fn from(err: BrokerError) -> Self {
        let kind = if err.is_transient() {
            ErrorKind::BrokerTransient
        } else {
            ErrorKind::BrokerFatal
        };
        Self::new(kind, err.to_string())
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        let kind = match &err {
            StoreError::PlaygroundNotFound(_) | StoreError::OrderNotFound(_) => ErrorKind::NotFound,
            StoreError::OrderIsNotOpenOrPending { .. }
            | StoreError::DuplicateOrder(_)
            | StoreError::DuplicateLiveAccount(_) => ErrorKind::Conflict,
            StoreError::Unavailable(_) => ErrorKind::Internal,
        };
        Self::new(kind, err.to_string())
    }
}

impl From<ConfigError> for EngineError {
    fn from(err: ConfigError) -> Self {
        Self::validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::OrderStatus;
    use crate::domain::shared::{OrderId, PlaygroundId};
    use test_case::test_case;

    #[test_case(ErrorKind::Validation => 2)]
    #[test_case(ErrorKind::NotFound => 3)]
    #[test_case(ErrorKind::BrokerTransient => 5)]
    #[test_case(ErrorKind::BrokerFatal => 5)]
    #[test_case(ErrorKind::Conflict => 1)]
    #[test_case(ErrorKind::Internal => 1)]
    fn exit_codes(kind: ErrorKind) -> i32 {
        kind.exit_code()
    }

    #[test_case(ErrorKind::Validation => 400)]
    #[test_case(ErrorKind::NotFound => 404)]
    #[test_case(ErrorKind::Conflict => 409)]
    #[test_case(ErrorKind::TradingNotAllowed => 423)]
    #[test_case(ErrorKind::BrokerTransient => 503)]
    #[test_case(ErrorKind::BrokerFatal => 502)]
    #[test_case(ErrorKind::Internal => 500)]
    fn http_statuses(kind: ErrorKind) -> u16 {
        kind.http_status()
    }

    #[test]
    fn playground_errors_map_to_kinds() {
        let not_found: EngineError =
            PlaygroundError::PlaygroundNotFound(PlaygroundId::new("pg-1")).into();
        assert_eq!(not_found.kind(), ErrorKind::NotFound);
        assert_eq!(not_found.context()[0].1, "pg-1");

        let closed: EngineError = PlaygroundError::TradingNotAllowed {
            order_id: OrderId::new("o-1"),
            status: OrderStatus::Filled,
        }
        .into();
        assert_eq!(closed.kind(), ErrorKind::TradingNotAllowed);

        let missing_link: EngineError =
            PlaygroundError::MissingReconcileLink(PlaygroundId::new("live")).into();
        assert_eq!(missing_link.kind(), ErrorKind::Internal);

        let terminal: EngineError = PlaygroundError::Order(OrderError::NotOpenOrPending {
            order_id: OrderId::new("o-2"),
            status: OrderStatus::Rejected,
        })
        .into();
        assert_eq!(terminal.kind(), ErrorKind::Conflict);

        let bad_input: EngineError = PlaygroundError::Order(OrderError::EmptySymbol).into();
        assert_eq!(bad_input.kind(), ErrorKind::Validation);
    }

    #[test]
    fn broker_errors_split_transient_and_fatal() {
        let transient: EngineError = BrokerError::RateLimited.into();
        assert_eq!(transient.kind(), ErrorKind::BrokerTransient);

        let fatal: EngineError = BrokerError::UnsupportedAccountType {
            account_type: "cash".to_string(),
        }
        .into();
        assert_eq!(fatal.kind(), ErrorKind::BrokerFatal);
    }

    #[test]
    fn response_carries_context() {
        let response = EngineError::validation("bad quantity")
            .with_context("field", "quantity")
            .to_response();
        assert_eq!(response.status, 400);
        assert_eq!(response.context.get("field").map(String::as_str), Some("quantity"));
    }

    #[test]
    fn display_includes_kind() {
        let error = EngineError::not_found("playground x not found");
        assert_eq!(error.to_string(), "[not_found] playground x not found");
    }
}
