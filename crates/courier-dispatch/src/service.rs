//! Intake service and state-transition gate.
//!
//! All business rules live here: validation, idempotency, cancel legality,
//! and batch limits. The HTTP layer and the workers depend on this service,
//! not on each other.

use std::sync::Arc;

use chrono::Utc;
use courier_core::{
    models::DEFAULT_MAX_RETRIES, Batch, BatchId, Channel, CoreError,
    CreateNotificationRequest, ListFilter, Notification, NotificationId, NotificationStore,
    Priority, Status,
};
use tracing::{error, warn};

use crate::queue::{Item, PriorityQueue};

/// Maximum notifications accepted in one batch.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Coordinates the store and the priority queue for intake operations.
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    queue: Arc<PriorityQueue>,
}

impl NotificationService {
    /// Creates the service over a store and queue shared with the engine.
    pub fn new(store: Arc<dyn NotificationStore>, queue: Arc<PriorityQueue>) -> Self {
        Self { store, queue }
    }

    /// Validates, persists, and enqueues a single notification.
    ///
    /// When `idempotency_key` matches an existing row, that row is returned
    /// unchanged with the duplicate flag set; callers use the flag to
    /// distinguish a replay (200) from a fresh create (201). The store's
    /// unique constraint backstops the pre-check, so two concurrent creates
    /// with the same key cannot both insert.
    pub async fn create(
        &self,
        request: CreateNotificationRequest,
        idempotency_key: Option<&str>,
    ) -> Result<(Notification, bool), CoreError> {
        request.validate()?;

        let key = idempotency_key.filter(|k| !k.is_empty());
        if let Some(key) = key {
            match self.store.get_by_idempotency_key(key).await {
                Ok(existing) => return Ok((existing, true)),
                Err(CoreError::NotFound) => {},
                Err(err) => return Err(err),
            }
        }

        let mut notification = build_notification(request, key, None)?;
        self.store.create(&notification).await?;

        self.enqueue(&mut notification).await;
        Ok((notification, false))
    }

    /// Validates and creates up to [`MAX_BATCH_SIZE`] notifications
    /// atomically, then enqueues the non-scheduled ones.
    ///
    /// The first invalid item aborts the whole batch before anything is
    /// persisted. Enqueue failures after the commit are logged; those rows
    /// stay `pending` and surface through the queue-depth gauges.
    pub async fn create_batch(
        &self,
        requests: Vec<CreateNotificationRequest>,
    ) -> Result<Batch, CoreError> {
        if requests.is_empty() {
            return Err(CoreError::BatchEmpty);
        }
        if requests.len() > MAX_BATCH_SIZE {
            return Err(CoreError::BatchTooLarge);
        }
        for request in &requests {
            request.validate()?;
        }

        let batch_id = BatchId::new();
        let mut notifications: Vec<Notification> = requests
            .into_iter()
            .map(|request| build_notification(request, None, Some(batch_id)))
            .collect::<Result<_, _>>()?;

        // Children share one timestamp so batch ordering is stable.
        let now = Utc::now();
        for notification in &mut notifications {
            notification.created_at = now;
            notification.updated_at = now;
        }

        let batch = self.store.create_batch(batch_id, &notifications).await?;

        for notification in &mut notifications {
            if notification.scheduled_at.is_none() {
                self.enqueue(notification).await;
            }
        }

        Ok(batch)
    }

    /// Cancels a notification if its current status allows it.
    ///
    /// A worker may pick the row between this check and its dispatch; the
    /// worker re-checks status before calling the provider, so the race is
    /// benign.
    pub async fn cancel(&self, id: NotificationId) -> Result<(), CoreError> {
        let notification = self.store.get_by_id(id).await?;

        match notification.status {
            Status::Cancelled => Err(CoreError::AlreadyCancelled),
            Status::Processing | Status::Sent => Err(CoreError::NotCancellable),
            _ => self.store.cancel(id).await,
        }
    }

    /// Fetches a notification by ID.
    pub async fn get_by_id(&self, id: NotificationId) -> Result<Notification, CoreError> {
        self.store.get_by_id(id).await
    }

    /// Paginated listing; see the store contract for filter semantics.
    pub async fn list(
        &self,
        filter: &ListFilter,
    ) -> Result<(Vec<Notification>, i64), CoreError> {
        self.store.list(filter).await
    }

    /// Fetches a batch and its children.
    pub async fn get_batch(
        &self,
        batch_id: BatchId,
    ) -> Result<(Batch, Vec<Notification>), CoreError> {
        self.store.get_batch(batch_id).await
    }

    /// Places the notification on the queue and transitions it to `queued`,
    /// reflecting the transition in the passed copy.
    ///
    /// On `QueueFull` the row simply stays `pending`; there is no local
    /// retry. Operators watch the queue-depth gauges for this condition.
    async fn enqueue(&self, notification: &mut Notification) {
        if notification.scheduled_at.is_some() {
            return; // picked up by the scheduled scheduler when due
        }

        let item = Item {
            notification_id: notification.id,
            channel: notification.channel,
            priority: notification.priority,
        };
        if let Err(err) = self.queue.enqueue(item) {
            warn!(
                notification_id = %notification.id,
                error = %err,
                "queue full: notification will remain pending"
            );
            return;
        }

        match self.store.update_status(notification.id, Status::Queued).await {
            Ok(()) => notification.status = Status::Queued,
            Err(err) => {
                error!(
                    notification_id = %notification.id,
                    error = %err,
                    "failed to update status to queued"
                );
            },
        }
    }
}

fn build_notification(
    request: CreateNotificationRequest,
    idempotency_key: Option<&str>,
    batch_id: Option<BatchId>,
) -> Result<Notification, CoreError> {
    // Callers validate first, so these parses only restate that check.
    let channel: Channel = request.channel.parse()?;
    let priority: Priority = request.priority.parse()?;

    let now = Utc::now();
    let status =
        if request.scheduled_at.is_some() { Status::Scheduled } else { Status::Pending };

    Ok(Notification {
        id: NotificationId::new(),
        batch_id,
        channel,
        recipient: request.recipient,
        content: request.content,
        priority,
        status,
        idempotency_key: idempotency_key.map(str::to_string),
        retry_count: 0,
        max_retries: DEFAULT_MAX_RETRIES,
        next_retry_at: None,
        scheduled_at: request.scheduled_at,
        sent_at: None,
        provider_msg_id: None,
        error_message: None,
        created_at: now,
        updated_at: now,
    })
}
