//! Infrastructure Layer
//!
//! Adapters for the ports defined in the application layer:
//!
//! - `broker/`: Broker adapters (scriptable mock)
//! - `persistence/`: Store adapters (in-memory)
//! - `config/`: Dependency wiring and request dispatch

pub mod broker;
pub mod config;
pub mod persistence;
