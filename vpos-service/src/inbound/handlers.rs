//! HTTP request handlers.

use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde_json::Value;

use vpos_types::{CallbackAck, PaymentGateway, PaymentStore};

use crate::service::Reconciler;

/// Application state shared across handlers.
pub struct AppState<S: PaymentStore, G: PaymentGateway> {
    pub reconciler: Reconciler<S, G>,
}

/// Health check endpoint.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "healthy" }))
}

/// Provider callback endpoint.
///
/// The provider's retry policy understands exactly two answers: 200 with
/// `{"status": "success"}` when the callback was verified and accounted for,
/// and 400 with `{"status": "fail"}` for everything else (malformed body,
/// failed verification, unknown transaction). No other detail leaks back.
#[tracing::instrument(skip_all)]
pub async fn callback<S: PaymentStore, G: PaymentGateway>(
    State(state): State<Arc<AppState<S, G>>>,
    payload: Result<Json<Value>, JsonRejection>,
) -> (StatusCode, Json<CallbackAck>) {
    let Ok(Json(payload)) = payload else {
        tracing::warn!("callback carried an unparseable body");
        return (StatusCode::BAD_REQUEST, Json(CallbackAck::fail()));
    };
    match state.reconciler.handle_callback(&payload).await {
        Ok(view) => {
            tracing::info!(transaction_id = %view.transaction_id, "callback acknowledged");
            (StatusCode::OK, Json(CallbackAck::success()))
        }
        Err(err) => {
            tracing::warn!(error = %err, "callback rejected");
            (StatusCode::BAD_REQUEST, Json(CallbackAck::fail()))
        }
    }
}
