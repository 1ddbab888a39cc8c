// Allow unwrap/expect in tests - tests should panic on unexpected errors
#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::needless_pass_by_value,
        clippy::default_trait_access,
        clippy::items_after_statements
    )
)]

//! Playground Engine - Rust Core Library
//!
//! Tick-driven trading playgrounds and the pipeline that reconciles them with
//! a broker.
//!
//! # Architecture (Clean Architecture + DDD + Hexagonal)
//!
//! ## Layers (inside → outside)
//!
//! - **Domain**: Core business logic
//!   - `market`: calendar, clock, bars, candle repositories
//!   - `order`: intents, records, trades, the order state machine
//!   - `playground`: the playground aggregate, mirroring, change sets
//!   - `shared`: identifiers, instruments, bounded event queues
//!
//! - **Application**: Use cases and orchestration
//!   - `ports`: `BrokerPort`, `StorePort`
//!   - `services`: playground registry, live feeds, order sync, reconciler
//!   - `use_cases`: `CreatePlayground`, `PlaceOrder`, `NextTick`, `CancelOrder`,
//!     queries, hydration
//!   - `dto`: request and response shapes
//!
//! - **Infrastructure**: Adapters
//!   - `broker`: scriptable mock broker
//!   - `persistence`: in-memory store
//!   - `config`: dependency injection container
//!
//! Simulator playgrounds are self-contained. Live playgrounds never talk to a
//! broker; each of their orders is mirrored into the account's reconcile
//! playground, and only reconcile orders are routed. The reconciler polls
//! routed orders and fans broker fills and status changes back out to the
//! live orders they reconcile.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Clean Architecture Layers
// =============================================================================

/// Domain layer - Core business logic with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Cross-cutting
// =============================================================================

/// YAML configuration.
pub mod config;

/// Error taxonomy.
pub mod error;

/// Metrics and logging.
pub mod observability;

// =============================================================================
// Re-exports
// =============================================================================

// Domain re-exports
pub use domain::order::{OrderIntent, OrderRecord, OrderSide, OrderStatus, OrderType, Trade};
pub use domain::playground::{Environment, LiveSource, Playground, TickDelta};
pub use domain::shared::{ExternalOrderId, Instrument, LiveAccountType, OrderId, PlaygroundId};

// Application re-exports
pub use application::dto::{EngineRequest, EngineResponse};
pub use application::ports::{BrokerError, BrokerPort, StoreError, StorePort};
pub use application::services::{PlaygroundRegistry, Reconciler};
pub use application::{CalendarSettings, EngineSettings};

// Infrastructure re-exports
pub use infrastructure::broker::MockBroker;
pub use infrastructure::config::Container;
pub use infrastructure::persistence::InMemoryStore;

pub use error::{EngineError, ErrorKind};
