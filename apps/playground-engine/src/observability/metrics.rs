//! Engine metrics.
//!
//! Recorded through the `metrics` facade; the embedding process installs the
//! exporter. Without one, every call is a no-op.

use metrics::{counter, gauge};

use crate::domain::order::OrderStatus;
use crate::domain::playground::Environment;

// ============================================================================
// Playground Metrics
// ============================================================================

/// Record a fill applied to a playground.
pub fn record_order_fill(environment: Environment) {
    counter!(
        "playground_order_fills_total",
        "environment" => environment.as_str()
    )
    .increment(1);
}

/// Record an order rejected in a playground.
pub fn record_order_rejection(environment: Environment) {
    counter!(
        "playground_order_rejections_total",
        "environment" => environment.as_str()
    )
    .increment(1);
}

/// Record an order a tick reported as invalid. Expired day orders are
/// counted apart from rejections.
pub fn record_invalid_order(environment: Environment, status: OrderStatus) {
    counter!(
        invalid_order_metric(status),
        "environment" => environment.as_str()
    )
    .increment(1);
}

const fn invalid_order_metric(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Expired => "playground_order_expirations_total",
        _ => "playground_order_rejections_total",
    }
}

/// Record a liquidation event.
pub fn record_liquidation() {
    counter!("playground_liquidations_total").increment(1);
}

// ============================================================================
// Request Metrics
// ============================================================================

/// Record one handled engine request.
///
/// # Arguments
///
/// * `request` - Request name (`"PlaceOrder"`, `"NextTick"`, ...)
/// * `outcome` - `"ok"` or the error kind
pub fn record_request(request: &'static str, outcome: &'static str) {
    counter!(
        "engine_requests_total",
        "request" => request,
        "outcome" => outcome
    )
    .increment(1);
}

// ============================================================================
// Reconciler Metrics
// ============================================================================

/// Record one broker order poll.
///
/// # Arguments
///
/// * `status` - Poll outcome (`"ok"`, `"transient"`, `"not_found"`, `"unknown_status"`, `"error"`)
pub fn record_broker_poll(status: &str) {
    counter!("reconciler_broker_polls_total", "status" => status.to_string()).increment(1);
}

/// Record a cache entry dropped without a commit.
///
/// # Arguments
///
/// * `reason` - Why it was dropped (`"trading_not_allowed"`, `"not_found"`, `"internal"`)
pub fn record_cache_drop(reason: &str) {
    counter!("reconciler_cache_drops_total", "reason" => reason.to_string()).increment(1);
}

/// Update the order cache size gauge.
pub fn update_order_cache_size(size: usize) {
    #[allow(clippy::cast_precision_loss)]
    gauge!("reconciler_order_cache_size").set(size as f64);
}
