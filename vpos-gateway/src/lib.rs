//! # vPOS Gateway
//!
//! Stateless request/response adapter over the card-payment provider's HTTP
//! API, implementing the `PaymentGateway` port.
//!
//! - `signer` - per-operation request digests (the provider's MD5 scheme)
//! - `wire` - JSON envelope and response normalization
//! - `client` - the `reqwest`-based client with a bounded timeout

pub mod client;
pub mod signer;
pub mod wire;

pub use client::{GatewayConfig, VposClient};
pub use signer::Signer;
