//! Order Bounded Context
//!
//! Order intents, records, trades, and the order lifecycle state machine.

pub mod errors;
pub mod intent;
pub mod order_record;
pub mod state_machine;
pub mod trade;
pub mod value_objects;

pub use errors::OrderError;
pub use intent::{OrderIntent, validate_tag};
pub use order_record::{CloseLink, OrderRecord};
pub use state_machine::OrderStateMachine;
pub use trade::Trade;
pub use value_objects::{OrderClass, OrderDuration, OrderSide, OrderStatus, OrderType};
