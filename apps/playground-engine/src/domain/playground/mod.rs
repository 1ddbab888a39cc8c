//! Playground Bounded Context
//!
//! The playground aggregate (balance, orders, trades, feeds, clock), the
//! change sets placement produces, live-to-reconcile mirroring, and the
//! read-side views a tick or an account query returns.

pub mod aggregate;
pub mod change;
pub mod errors;
pub mod meta;
pub mod mirror;
pub mod position;
pub mod tick_delta;

pub use aggregate::{FillEntry, FillOutcome, Playground, PlaygroundSnapshot};
pub use change::{Change, ChangeSet, PlaygroundResolver};
pub use errors::PlaygroundError;
pub use meta::{Capabilities, Environment, LiveSource, Meta};
pub use mirror::{MirrorLeg, MirrorPlan, RECONCILE_CLOSE_TAG};
pub use position::{Lot, Position};
pub use tick_delta::{AccountSnapshot, EquityPoint, OrderFilter, TickDelta, TickEvent};
