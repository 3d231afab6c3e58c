//! HTTP server configuration and startup.

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use vpos_types::{PaymentGateway, PaymentStore};

use super::handlers::{self, AppState};
use crate::service::Reconciler;

/// HTTP server exposing the provider callback boundary.
pub struct HttpServer<S: PaymentStore, G: PaymentGateway> {
    state: Arc<AppState<S, G>>,
}

impl<S: PaymentStore, G: PaymentGateway> HttpServer<S, G> {
    /// Creates a new HTTP server around the reconciler.
    pub fn new(reconciler: Reconciler<S, G>) -> Self {
        Self {
            state: Arc::new(AppState { reconciler }),
        }
    }

    /// Builds the Axum router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/vpos/callback", post(handlers::callback::<S, G>))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Runs the server on the given address with graceful shutdown.
    pub async fn run(self, addr: &str) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!("Server listening on {}", listener.local_addr()?);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        Ok(())
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown...");
}
