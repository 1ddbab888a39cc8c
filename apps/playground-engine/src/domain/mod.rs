//! Domain Layer
//!
//! Pure domain logic with no infrastructure dependencies.
//!
//! # Bounded Contexts
//!
//! - [`market`]: calendar, clock, bars, and candle repositories
//! - [`order`]: order intents, records, trades, and the order state machine
//! - [`playground`]: the playground aggregate, placement change sets, and mirroring
//! - [`shared`]: identifiers, instruments, account types, and event queues

pub mod market;
pub mod order;
pub mod playground;
pub mod shared;
