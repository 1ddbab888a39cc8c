//! Order errors.

use std::fmt;

use rust_decimal::Decimal;

use super::value_objects::{OrderClass, OrderStatus, OrderType};
use crate::domain::shared::OrderId;

/// Errors raised by order validation and the order state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// Symbol is empty.
    EmptySymbol,

    /// Absolute quantity must be positive.
    NonPositiveQuantity {
        /// Quantity supplied.
        quantity: Decimal,
    },

    /// A price field is missing, unexpected, or not positive.
    InvalidPrice {
        /// Field name (`limit_price` or `stop_price`).
        field: &'static str,
        /// Order type the field was checked against.
        order_type: OrderType,
        /// What is wrong with the field.
        message: &'static str,
    },

    /// Tag is too long or has characters outside `[A-Za-z0-9-]`.
    InvalidTag {
        /// Offending tag.
        tag: String,
    },

    /// Asset class cannot be filled here.
    UnsupportedClass {
        /// Asset class.
        class: OrderClass,
    },

    /// Transition not allowed by the state machine.
    InvalidStateTransition {
        /// Current status.
        from: OrderStatus,
        /// Attempted status.
        to: OrderStatus,
    },

    /// Order is in a terminal state.
    NotOpenOrPending {
        /// Order id.
        order_id: OrderId,
        /// Current status.
        status: OrderStatus,
    },

    /// Order is already completely filled.
    AlreadyFilled {
        /// Order id.
        order_id: OrderId,
    },

    /// Fill quantity exceeds what is left on the order.
    FillExceedsRemaining {
        /// Order id.
        order_id: OrderId,
        /// Fill quantity attempted (absolute).
        fill_quantity: Decimal,
        /// Remaining quantity.
        remaining: Decimal,
    },

    /// Fill price must be positive.
    NonPositiveFillPrice {
        /// Price supplied.
        price: Decimal,
    },

    /// Fill quantity must be non-zero.
    ZeroFillQuantity,
}

impl fmt::Display for OrderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptySymbol => write!(f, "symbol must not be empty"),
            Self::NonPositiveQuantity { quantity } => {
                write!(f, "quantity must be positive, got {quantity}")
            }
            Self::InvalidPrice {
                field,
                order_type,
                message,
            } => write!(f, "{field} {message} for {order_type} orders"),
            Self::InvalidTag { tag } => write!(
                f,
                "invalid tag '{tag}': at most 255 characters from [A-Za-z0-9-]"
            ),
            Self::UnsupportedClass { class } => {
                write!(f, "only equity orders can be filled, got {class}")
            }
            Self::InvalidStateTransition { from, to } => {
                write!(f, "invalid order state transition: {from} -> {to}")
            }
            Self::NotOpenOrPending { order_id, status } => {
                write!(f, "order {order_id} is not open or pending (status {status})")
            }
            Self::AlreadyFilled { order_id } => write!(f, "order {order_id} is already filled"),
            Self::FillExceedsRemaining {
                order_id,
                fill_quantity,
                remaining,
            } => write!(
                f,
                "fill of {fill_quantity} exceeds remaining {remaining} on order {order_id}"
            ),
            Self::NonPositiveFillPrice { price } => {
                write!(f, "fill price must be positive, got {price}")
            }
            Self::ZeroFillQuantity => write!(f, "fill quantity must be non-zero"),
        }
    }
}

impl std::error::Error for OrderError {}
