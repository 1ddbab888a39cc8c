//! Order DTOs

use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderIntent, OrderRecord};
use crate::domain::shared::{OrderId, PlaygroundId};

/// `PlaceOrder` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderRequestDto {
    /// Target playground.
    pub playground_id: PlaygroundId,
    /// The order.
    #[serde(flatten)]
    pub order: OrderIntent,
    /// Override the environment's default for risk checks.
    #[serde(default)]
    pub perform_checks: Option<bool>,
}

/// `PlaceOrder` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrderResponseDto {
    /// The placed order.
    pub order: OrderRecord,
    /// Reconcile orders created for it, close leg first.
    #[serde(default)]
    pub reconcile_orders: Vec<OrderRecord>,
}

/// `CancelOrder` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrderRequestDto {
    /// Playground.
    pub playground_id: PlaygroundId,
    /// Order to cancel.
    pub order_id: OrderId,
}

/// `CancelOrder` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOrderResponseDto {
    /// The canceled order.
    pub order: OrderRecord,
    /// Reconcile orders canceled with it.
    #[serde(default)]
    pub reconcile_orders: Vec<OrderRecord>,
}
