//! Durable store contract for notifications and batches.
//!
//! The dispatch engine depends on this trait only; any backend providing row
//! uniqueness, timestamp indexes, and a multi-insert transaction can
//! implement it. `storage::PgStore` is the production implementation,
//! `storage::MemoryStore` backs tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    error::Result,
    models::{Batch, BatchId, ListFilter, Notification, NotificationId, Status},
};

/// Maximum rows returned by a single due-query poll.
pub const DUE_QUERY_LIMIT: i64 = 500;

/// Persistence operations required by the dispatch engine and service layer.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Inserts a notification. Fails with `Conflict` when the idempotency
    /// key collides with an existing row; the collision is detected
    /// atomically by the store.
    async fn create(&self, notification: &Notification) -> Result<()>;

    /// Fetches a notification by ID. `NotFound` when absent.
    async fn get_by_id(&self, id: NotificationId) -> Result<Notification>;

    /// Fetches a notification by its idempotency key. `NotFound` when absent.
    async fn get_by_idempotency_key(&self, key: &str) -> Result<Notification>;

    /// Paginated listing ordered by `created_at` descending. Returns the
    /// page rows and the unpaginated match count.
    async fn list(&self, filter: &ListFilter) -> Result<(Vec<Notification>, i64)>;

    /// Blind status transition.
    async fn update_status(&self, id: NotificationId, status: Status) -> Result<()>;

    /// Terminal success: sets status `sent`, records the provider message ID
    /// and timestamp, clears any previous error message.
    async fn mark_sent(
        &self,
        id: NotificationId,
        provider_msg_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()>;

    /// Terminal failure: sets status `failed` and clears `next_retry_at`.
    async fn mark_failed(&self, id: NotificationId, error_message: &str) -> Result<()>;

    /// Schedules a retry: sets status `failed`, bumps the retry count, and
    /// records when the retry becomes due.
    async fn schedule_retry(
        &self,
        id: NotificationId,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()>;

    /// Sets status `cancelled` unconditionally. Legality is enforced by the
    /// service layer.
    async fn cancel(&self, id: NotificationId) -> Result<()>;

    /// Failed rows with retries remaining whose `next_retry_at` has arrived,
    /// capped at [`DUE_QUERY_LIMIT`].
    async fn find_due_retries(&self) -> Result<Vec<Notification>>;

    /// Scheduled rows whose `scheduled_at` has arrived, capped at
    /// [`DUE_QUERY_LIMIT`].
    async fn find_due_scheduled(&self) -> Result<Vec<Notification>>;

    /// Inserts a batch row and all child notifications atomically: either
    /// every row exists afterwards or none do.
    async fn create_batch(
        &self,
        batch_id: BatchId,
        notifications: &[Notification],
    ) -> Result<Batch>;

    /// Fetches a batch and its children, children ordered by `created_at`
    /// ascending. `NotFound` when the batch is absent.
    async fn get_batch(&self, batch_id: BatchId) -> Result<(Batch, Vec<Notification>)>;

    /// Recomputes batch counters from the authoritative child rows.
    /// Idempotent; concurrent invocations converge to the same counts.
    async fn update_batch_counts(&self, batch_id: BatchId) -> Result<()>;
}
