//! Batch endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use courier_core::{Batch, CreateBatchRequest, Notification};
use serde::Serialize;
use uuid::Uuid;

use super::ApiError;
use crate::AppState;

/// Handles `POST /api/v1/notifications/batch`.
pub async fn create_batch(
    State(state): State<AppState>,
    Json(request): Json<CreateBatchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let batch = state.service.create_batch(request.notifications).await?;
    Ok((StatusCode::CREATED, Json(batch)))
}

/// Batch with its child notifications.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    /// Batch row with its counters.
    pub batch: Batch,
    /// Children ordered by creation time.
    pub notifications: Vec<Notification>,
}

/// Handles `GET /api/v1/batches/{id}`.
pub async fn get_batch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BatchResponse>, ApiError> {
    let (batch, notifications) = state.service.get_batch(id.into()).await?;
    Ok(Json(BatchResponse { batch, notifications }))
}
