//! Request handlers and error translation.
//!
//! Each handler delegates to the service layer and converts domain errors to
//! HTTP status codes in one place, so the mapping cannot drift between
//! endpoints.

pub mod batches;
pub mod health;
pub mod notifications;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use courier_core::CoreError;
use serde::Serialize;

pub use batches::{create_batch, get_batch};
pub use health::{health, metrics};
pub use notifications::{cancel, create, get_by_id, list};

/// JSON error envelope returned on every failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Human-readable error description.
    pub error: String,
}

/// Domain error carrying its HTTP translation.
#[derive(Debug)]
pub struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::NotFound => StatusCode::NOT_FOUND,
            CoreError::Conflict | CoreError::AlreadyCancelled | CoreError::NotCancellable => {
                StatusCode::CONFLICT
            },
            CoreError::InvalidChannel
            | CoreError::InvalidPriority
            | CoreError::InvalidRecipient
            | CoreError::InvalidContent
            | CoreError::BatchEmpty
            | CoreError::BatchTooLarge => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::QueueFull => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // Store failures stay in the logs; callers get a generic message.
        let message = match &self.0 {
            CoreError::Database(detail) => {
                tracing::error!(error = %detail, "request failed on store error");
                "internal server error".to_string()
            },
            err => err.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}
