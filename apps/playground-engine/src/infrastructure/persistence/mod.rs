//! Persistence Adapters
//!
//! Store implementations of `StorePort`.

pub mod in_memory;

pub use in_memory::InMemoryStore;
