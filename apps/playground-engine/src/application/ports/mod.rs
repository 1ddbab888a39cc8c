//! Application Ports (Driven)
//!
//! Ports define how the engine reaches the broker and the store.

mod broker_port;
mod store_port;

pub use broker_port::{
    BrokerAccountType, BrokerError, BrokerOrderStatus, BrokerPort, BrokerPosition, BrokerQuote,
    EquitySnapshot, OrderSnapshot, PlaceEquityTradeRequest,
};
pub use store_port::{LiveAccount, PlaygroundSession, StoreError, StorePort};
