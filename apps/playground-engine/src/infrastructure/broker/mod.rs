//! Broker adapters.

pub mod mock;

pub use mock::{MOCK_BROKER_NAME, MockBroker};
