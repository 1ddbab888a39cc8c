//! Order State Machine
//!
//! ```text
//! pending ──accept──► open ──fill──► filled
//!    │                 │        └──partial──► partially_filled ──fill──► filled
//!    │                 └──reject/cancel/expire──► terminal
//!    └──reject/cancel──► terminal (never reached the broker)
//! ```

use super::errors::OrderError;
use super::value_objects::OrderStatus;
use crate::domain::shared::OrderId;

/// Order State Machine for validating transitions.
pub struct OrderStateMachine;

impl OrderStateMachine {
    /// Check if a state transition is valid.
    #[must_use]
    pub const fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
        matches!(
            (from, to),
            // From Pending
            (OrderStatus::Pending, OrderStatus::Open)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Pending, OrderStatus::Canceled)
                // From Open
                | (OrderStatus::Open, OrderStatus::Filled)
                | (OrderStatus::Open, OrderStatus::PartiallyFilled)
                | (OrderStatus::Open, OrderStatus::Rejected)
                | (OrderStatus::Open, OrderStatus::Canceled)
                | (OrderStatus::Open, OrderStatus::Expired)
                // From PartiallyFilled
                | (OrderStatus::PartiallyFilled, OrderStatus::PartiallyFilled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Filled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Canceled)
                | (OrderStatus::PartiallyFilled, OrderStatus::Expired)
        )
    }

    /// Validate a state transition.
    ///
    /// Leaving a terminal state fails with [`OrderError::NotOpenOrPending`].
    pub fn validate_transition(
        order_id: &OrderId,
        from: OrderStatus,
        to: OrderStatus,
    ) -> Result<(), OrderError> {
        if from.is_terminal() {
            return Err(OrderError::NotOpenOrPending {
                order_id: order_id.clone(),
                status: from,
            });
        }

        if Self::is_valid_transition(from, to) {
            Ok(())
        } else {
            Err(OrderError::InvalidStateTransition { from, to })
        }
    }

    /// Get all valid next states from a given state.
    #[must_use]
    pub fn valid_next_states(from: OrderStatus) -> Vec<OrderStatus> {
        match from {
            OrderStatus::Pending => vec![
                OrderStatus::Open,
                OrderStatus::Rejected,
                OrderStatus::Canceled,
            ],
            OrderStatus::Open => vec![
                OrderStatus::Filled,
                OrderStatus::PartiallyFilled,
                OrderStatus::Rejected,
                OrderStatus::Canceled,
                OrderStatus::Expired,
            ],
            OrderStatus::PartiallyFilled => vec![
                OrderStatus::PartiallyFilled,
                OrderStatus::Filled,
                OrderStatus::Canceled,
                OrderStatus::Expired,
            ],
            OrderStatus::Filled
            | OrderStatus::Rejected
            | OrderStatus::Canceled
            | OrderStatus::Expired => vec![],
        }
    }
}
