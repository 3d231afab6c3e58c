//! # vPOS Types
//!
//! Domain types and port traits for the vPOS merchant integration.
//! This crate has ZERO external IO dependencies - only data structures,
//! business rules, and trait definitions.
//!
//! ## Architecture
//!
//! This crate represents the **innermost core** of the hexagonal architecture:
//! - `domain/` - Pure domain types (Money, Card, Transaction, Reversion)
//! - `ports/` - Trait definitions that adapters must implement
//! - `dto/` - Projections crossing the API boundary
//! - `error/` - Domain and application error types

pub mod domain;
pub mod dto;
pub mod error;
pub mod ports;

// Re-export commonly used types
pub use domain::{
    CURRENCY, Card, CardDetails, CardId, Money, NewTransaction, PaymentRef, Reversion,
    ReversionId, ReversionStatus, RiskIndex, Transaction, TransactionEvent, TransactionId,
    TransactionStatus, TransactionUpdate, UserId,
};
pub use dto::*;
pub use error::{AppError, DomainError, RepoError};
pub use ports::{
    CardEnrollment, ChargeOrder, GatewayCard, GatewayError, GatewayOutcome, PaymentGateway,
    PaymentStore, ProcessId, RollbackOutcome, SingleBuyOrder,
};
