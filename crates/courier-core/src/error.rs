//! Error taxonomy shared across the courier workspace.
//!
//! One variant per failure kind the service surfaces, so the HTTP layer can
//! map errors to status codes one-to-one. Store implementations translate
//! database errors here; in particular a unique-constraint violation becomes
//! `Conflict` so idempotency-key collisions are detected atomically by the
//! store rather than by a read-then-write check.

use thiserror::Error;

/// Result type alias using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Domain error kinds for intake, lifecycle, and persistence failures.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Requested row does not exist.
    #[error("not found")]
    NotFound,

    /// Idempotency key already exists.
    #[error("conflict: idempotency key already exists")]
    Conflict,

    /// Channel is not one of sms, email, push.
    #[error("invalid channel: must be sms, email, or push")]
    InvalidChannel,

    /// Priority is not one of high, normal, low.
    #[error("invalid priority: must be high, normal, or low")]
    InvalidPriority,

    /// Recipient is empty.
    #[error("recipient must not be empty")]
    InvalidRecipient,

    /// Content is empty or exceeds 4096 bytes.
    #[error("content must be between 1 and 4096 characters")]
    InvalidContent,

    /// Batch request contained no notifications.
    #[error("batch must contain at least one notification")]
    BatchEmpty,

    /// Batch request exceeded the 1000-item limit.
    #[error("batch exceeds maximum of 1000 notifications")]
    BatchTooLarge,

    /// Cancel requested for a notification that is already cancelled.
    #[error("notification is already cancelled")]
    AlreadyCancelled,

    /// Cancel requested for a notification in a non-cancellable status.
    #[error("notification cannot be cancelled in its current status")]
    NotCancellable,

    /// The target priority tier is at capacity.
    #[error("queue is at capacity, try again later")]
    QueueFull,

    /// Underlying store failure.
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound,
            sqlx::Error::Database(db_err) if db_err.is_unique_violation() => Self::Conflict,
            _ => Self::Database(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err = CoreError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, CoreError::NotFound));
    }

    #[test]
    fn error_messages_are_stable() {
        assert_eq!(CoreError::NotFound.to_string(), "not found");
        assert_eq!(
            CoreError::QueueFull.to_string(),
            "queue is at capacity, try again later"
        );
        assert_eq!(
            CoreError::InvalidContent.to_string(),
            "content must be between 1 and 4096 characters"
        );
    }
}
