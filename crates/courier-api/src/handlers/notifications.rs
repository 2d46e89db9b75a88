//! Single-notification endpoints.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use courier_core::{Channel, CreateNotificationRequest, ListFilter, Notification, Status};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ApiError;
use crate::AppState;

/// Header carrying the caller's idempotency key.
pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

const DEFAULT_PAGE_SIZE: i64 = 20;
const MAX_PAGE_SIZE: i64 = 100;

/// Handles `POST /api/v1/notifications`.
///
/// Returns 201 for a newly created notification and 200 with the existing
/// row when the idempotency key was seen before.
pub async fn create(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateNotificationRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let idempotency_key =
        headers.get(IDEMPOTENCY_HEADER).and_then(|value| value.to_str().ok());

    let (notification, duplicate) = state.service.create(request, idempotency_key).await?;

    let status = if duplicate { StatusCode::OK } else { StatusCode::CREATED };
    Ok((status, Json(notification)))
}

/// Handles `GET /api/v1/notifications/{id}`.
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Notification>, ApiError> {
    let notification = state.service.get_by_id(id.into()).await?;
    Ok(Json(notification))
}

/// Query parameters accepted by the listing endpoint.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Filter by lifecycle status.
    pub status: Option<Status>,
    /// Filter by delivery channel.
    pub channel: Option<Channel>,
    /// Created at or after this time (RFC 3339).
    pub from: Option<DateTime<Utc>>,
    /// Created at or before this time (RFC 3339).
    pub to: Option<DateTime<Utc>>,
    /// 1-based page number, default 1.
    pub page: Option<i64>,
    /// Page size, default 20, max 100.
    pub limit: Option<i64>,
}

/// Paginated listing response.
#[derive(Debug, Serialize)]
pub struct ListResponse {
    /// Page of notifications, newest first.
    pub data: Vec<Notification>,
    /// Unpaginated match count.
    pub total: i64,
    /// Page that was returned.
    pub page: i64,
    /// Page size that was applied.
    pub limit: i64,
}

/// Handles `GET /api/v1/notifications`.
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, ApiError> {
    let page = query.page.filter(|p| *p > 0).unwrap_or(1);
    let limit = query
        .limit
        .filter(|l| (1..=MAX_PAGE_SIZE).contains(l))
        .unwrap_or(DEFAULT_PAGE_SIZE);

    let filter = ListFilter {
        status: query.status,
        channel: query.channel,
        from: query.from,
        to: query.to,
        page,
        limit,
    };
    let (data, total) = state.service.list(&filter).await?;

    Ok(Json(ListResponse { data, total, page, limit }))
}

/// Handles `DELETE /api/v1/notifications/{id}`.
pub async fn cancel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.service.cancel(id.into()).await?;
    Ok(StatusCode::NO_CONTENT)
}
