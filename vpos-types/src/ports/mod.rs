//! Port traits (interfaces for adapters).
//!
//! These are the contracts that adapters must implement.
//! The application layer depends on these traits, not concrete implementations.

mod gateway;
mod repository;

pub use gateway::{
    CardEnrollment, ChargeOrder, GatewayCard, GatewayError, GatewayOutcome, PaymentGateway,
    ProcessId, RollbackOutcome, SingleBuyOrder,
};
pub use repository::PaymentStore;
