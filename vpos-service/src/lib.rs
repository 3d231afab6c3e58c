//! # vPOS Service
//!
//! Application service layer and HTTP adapter for the vPOS merchant
//! integration.
//!
//! ## Architecture
//!
//! - `service/` - application services orchestrating the two ports
//!   (`CardRegistry`, `TransactionLedger`, `Reconciler`)
//! - `inbound/` - HTTP adapter (Axum callback endpoint and health probe)
//!
//! Services are generic over `S: PaymentStore` and `G: PaymentGateway`, so
//! adapters are injected at compile time and tests run against in-crate
//! mocks.

pub mod inbound;
pub mod service;

#[cfg(test)]
mod service_tests;

pub use service::{
    CardRegistry, ChargeRequest, EnrollmentDefaults, EnrollmentRequest, Reconciler,
    SingleBuyRequest, TransactionLedger,
};
