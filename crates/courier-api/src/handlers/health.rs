//! Health and metrics endpoints.

use axum::{extract::State, response::IntoResponse, Json};
use courier_dispatch::metrics::record_queue_depths;
use serde_json::json;

use crate::AppState;

/// Handles `GET /health`.
pub async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Handles `GET /metrics`: Prometheus text exposition.
///
/// Queue depth gauges are refreshed at scrape time so the snapshot reflects
/// the moment of the request.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    record_queue_depths(&state.queue);
    match &state.prometheus {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}
