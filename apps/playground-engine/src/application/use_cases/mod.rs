//! Application Use Cases
//!
//! Use cases orchestrate domain logic to fulfill application requirements.

mod cancel_order;
mod create_playground;
mod hydrate;
mod next_tick;
mod place_order;
mod queries;

pub use cancel_order::CancelOrderUseCase;
pub use create_playground::CreatePlaygroundUseCase;
pub use hydrate::{HydrateReport, HydrateUseCase};
pub use next_tick::NextTickUseCase;
pub use place_order::PlaceOrderUseCase;
pub use queries::{AppendBarsUseCase, GetAccountUseCase, GetCandlesUseCase};
