//! Playground errors.

use rust_decimal::Decimal;

use super::meta::Environment;
use crate::domain::market::{CandleError, ClockError};
use crate::domain::order::{OrderError, OrderSide, OrderStatus};
use crate::domain::shared::{ExternalOrderId, Instrument, OrderId, PlaygroundId, QueueError};

/// Errors raised by the playground aggregate and its change sets.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaygroundError {
    /// Meta failed validation at creation.
    #[error("invalid playground meta: {0}")]
    InvalidMeta(String),

    /// Order rule violated.
    #[error(transparent)]
    Order(#[from] OrderError),

    /// Candle feed error.
    #[error(transparent)]
    Candle(#[from] CandleError),

    /// Clock error.
    #[error(transparent)]
    Clock(#[from] ClockError),

    /// Outbound queue full or closed.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// Playground not known to the resolver.
    #[error("playground {0} not found")]
    PlaygroundNotFound(PlaygroundId),

    /// Order not in this playground.
    #[error("order {order_id} not found in playground {playground_id}")]
    OrderNotFound {
        /// Playground searched.
        playground_id: PlaygroundId,
        /// Order id.
        order_id: OrderId,
    },

    /// An order with this id already exists.
    #[error("order {0} already exists")]
    DuplicateOrder(OrderId),

    /// No order with this broker id in this playground.
    #[error("no order with external id {external_id} in playground {playground_id}")]
    ExternalOrderNotFound {
        /// Playground searched.
        playground_id: PlaygroundId,
        /// Broker id.
        external_id: ExternalOrderId,
    },

    /// No observable price for the instrument.
    #[error("no price available for {symbol}")]
    NoPrice {
        /// Instrument.
        symbol: Instrument,
    },

    /// Risk check: not enough free margin.
    #[error("insufficient free margin: required {required}, free {free_margin}")]
    InsufficientFreeMargin {
        /// Margin the order needs.
        required: Decimal,
        /// Margin available.
        free_margin: Decimal,
    },

    /// Risk check: side conflicts with the position.
    #[error("cannot {side} {symbol} with position {position}")]
    SideNotAllowed {
        /// Instrument.
        symbol: Instrument,
        /// Requested side.
        side: OrderSide,
        /// Position including pending orders.
        position: Decimal,
    },

    /// Order no longer accepts fills.
    #[error("trading not allowed on order {order_id} in status {status}")]
    TradingNotAllowed {
        /// Order id.
        order_id: OrderId,
        /// Current status.
        status: OrderStatus,
    },

    /// Operation not available in this environment.
    #[error("{operation} is not supported in {environment} playgrounds")]
    Unsupported {
        /// Playground environment.
        environment: Environment,
        /// Operation attempted.
        operation: &'static str,
    },

    /// Live playground has no usable reconcile link.
    #[error("live playground {0} has no reconcile playground")]
    MissingReconcileLink(PlaygroundId),

    /// Order was already sent to the broker and cannot be withdrawn locally.
    #[error("order {order_id} was already routed as {external_id}")]
    AlreadyRouted {
        /// Reconcile order id.
        order_id: OrderId,
        /// Broker id.
        external_id: ExternalOrderId,
    },
}
