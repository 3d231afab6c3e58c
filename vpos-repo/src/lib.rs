//! # vPOS Repo
//!
//! Persistence adapters implementing the `PaymentStore` port.
//!
//! Two adapters are provided: `SqliteStore` for deployments and
//! `MemoryStore` for tests and ephemeral setups. Both honor the port's
//! atomicity contract: single-default-card updates and only-if-pending
//! transaction finalization.

pub mod memory;
pub mod sqlite;
mod types;


pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
