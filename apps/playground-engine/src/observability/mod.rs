//! Observability module for metrics and logging.
//!
//! This module provides instrumentation for the playground engine: counters
//! and gauges through the `metrics` facade, and `tracing` subscriber setup.

mod metrics;
mod tracing;

pub use metrics::{
    record_broker_poll, record_cache_drop, record_invalid_order, record_liquidation,
    record_order_fill, record_order_rejection, record_request, update_order_cache_size,
};
pub use tracing::{TracingError, default_directive, init_tracing};
