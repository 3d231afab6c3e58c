//! HTTP inbound adapter.
//!
//! Exposes exactly two routes: the provider callback endpoint and a health
//! probe. Everything else the merchant application calls directly through
//! the service layer.

pub mod handlers;
pub mod server;

pub use server::HttpServer;
