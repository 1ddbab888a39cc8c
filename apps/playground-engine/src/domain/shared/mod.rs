//! Shared Domain Types
//!
//! Identifiers, the instrument value object, and the bounded event queue
//! shared across the market, order, and playground contexts.

mod account;
mod identifiers;
mod instrument;
pub mod queue;

pub use account::LiveAccountType;
pub use identifiers::{ExternalOrderId, OrderId, OrderRef, PlaygroundId, TradeId};
pub use instrument::Instrument;
pub use queue::{EventQueue, QueueError};
