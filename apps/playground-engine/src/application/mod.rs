//! Application Layer
//!
//! Use cases, ports, DTOs, and the services they share. Depends on the
//! domain only; adapters live in the infrastructure layer.

pub mod dto;
pub mod ports;
pub mod services;
pub mod use_cases;

mod settings;

pub use settings::{CalendarSettings, EngineSettings};
