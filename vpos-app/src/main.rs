//! # vPOS Application
//!
//! Binary that wires together all the components:
//! - Load configuration from environment
//! - Initialize the SQLite store and the gateway client
//! - Create the reconciler and subscribe to its transaction events
//! - Start the HTTP server exposing the provider callback

mod config;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vpos_gateway::{GatewayConfig, VposClient};
use vpos_repo::SqliteStore;
use vpos_service::{Reconciler, inbound::HttpServer};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,vpos_app=debug,vpos_service=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = config::Config::from_env()?;

    tracing::info!("Starting vPOS callback server on port {}", config.port);
    tracing::info!("Using database: {}", config.database_url);

    // Build the store (handles connection and migration)
    let store = Arc::new(SqliteStore::new(&config.database_url).await?);

    // Build the gateway client against the configured environment
    let gateway_config = match &config.base_url_override {
        Some(base_url) => {
            GatewayConfig::with_base_url(&config.public_key, &config.private_key, base_url)
        }
        None if config.test_mode => GatewayConfig::test(&config.public_key, &config.private_key),
        None => GatewayConfig::live(&config.public_key, &config.private_key),
    }
    .with_timeout(config.gateway_timeout);
    let gateway = Arc::new(VposClient::new(gateway_config)?);

    // Create the reconciler and log every applied callback
    let reconciler = Reconciler::new(store, gateway);
    let mut events = reconciler.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(
                transaction_id = %event.transaction_id,
                status = %event.view.status,
                "transaction updated by callback"
            );
        }
    });

    // Create and run the HTTP server
    let server = HttpServer::new(reconciler);
    let addr = format!("0.0.0.0:{}", config.port);

    server.run(&addr).await?;
    Ok(())
}
