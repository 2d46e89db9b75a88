//! In-memory store implementation.
//!
//! Implements the full [`NotificationStore`] contract over process-local
//! maps. Used by unit and pipeline tests across the workspace, mirroring the
//! blind-update semantics of the PostgreSQL backend (status updates on a
//! missing row are no-ops, reads return `NotFound`).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    error::{CoreError, Result},
    models::{Batch, BatchId, ListFilter, Notification, NotificationId, Status},
    store::{NotificationStore, DUE_QUERY_LIMIT},
};

#[derive(Default)]
struct Inner {
    notifications: HashMap<NotificationId, Notification>,
    batches: HashMap<BatchId, Batch>,
}

/// Store over in-process maps, safe for concurrent use.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(filter: &ListFilter, n: &Notification) -> bool {
        if filter.status.is_some_and(|s| s != n.status) {
            return false;
        }
        if filter.channel.is_some_and(|c| c != n.channel) {
            return false;
        }
        if filter.from.is_some_and(|from| n.created_at < from) {
            return false;
        }
        if filter.to.is_some_and(|to| n.created_at > to) {
            return false;
        }
        true
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn create(&self, notification: &Notification) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(key) = &notification.idempotency_key {
            let collision = inner
                .notifications
                .values()
                .any(|n| n.idempotency_key.as_deref() == Some(key.as_str()));
            if collision {
                return Err(CoreError::Conflict);
            }
        }
        inner.notifications.insert(notification.id, notification.clone());
        Ok(())
    }

    async fn get_by_id(&self, id: NotificationId) -> Result<Notification> {
        let inner = self.inner.read().await;
        inner.notifications.get(&id).cloned().ok_or(CoreError::NotFound)
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Notification> {
        let inner = self.inner.read().await;
        inner
            .notifications
            .values()
            .find(|n| n.idempotency_key.as_deref() == Some(key))
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    async fn list(&self, filter: &ListFilter) -> Result<(Vec<Notification>, i64)> {
        let inner = self.inner.read().await;
        let mut rows: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| Self::matches(filter, n))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let total = rows.len() as i64;
        let offset = ((filter.page - 1) * filter.limit).max(0) as usize;
        let page: Vec<Notification> =
            rows.into_iter().skip(offset).take(filter.limit.max(0) as usize).collect();

        Ok((page, total))
    }

    async fn update_status(&self, id: NotificationId, status: Status) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(n) = inner.notifications.get_mut(&id) {
            n.status = status;
            n.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_sent(
        &self,
        id: NotificationId,
        provider_msg_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(n) = inner.notifications.get_mut(&id) {
            n.status = Status::Sent;
            n.provider_msg_id = Some(provider_msg_id.to_string());
            n.sent_at = Some(sent_at);
            n.error_message = None;
            n.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_failed(&self, id: NotificationId, error_message: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(n) = inner.notifications.get_mut(&id) {
            n.status = Status::Failed;
            n.error_message = Some(error_message.to_string());
            n.next_retry_at = None;
            n.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: NotificationId,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if let Some(n) = inner.notifications.get_mut(&id) {
            n.status = Status::Failed;
            n.retry_count = retry_count;
            n.next_retry_at = Some(next_retry_at);
            n.error_message = Some(error_message.to_string());
            n.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn cancel(&self, id: NotificationId) -> Result<()> {
        self.update_status(id, Status::Cancelled).await
    }

    async fn find_due_retries(&self) -> Result<Vec<Notification>> {
        let now = Utc::now();
        let inner = self.inner.read().await;
        let mut due: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| {
                n.status == Status::Failed
                    && n.retry_count < n.max_retries
                    && n.next_retry_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|n| n.next_retry_at);
        due.truncate(DUE_QUERY_LIMIT as usize);
        Ok(due)
    }

    async fn find_due_scheduled(&self) -> Result<Vec<Notification>> {
        let now = Utc::now();
        let inner = self.inner.read().await;
        let mut due: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| {
                n.status == Status::Scheduled && n.scheduled_at.is_some_and(|at| at <= now)
            })
            .cloned()
            .collect();
        due.sort_by_key(|n| n.scheduled_at);
        due.truncate(DUE_QUERY_LIMIT as usize);
        Ok(due)
    }

    async fn create_batch(
        &self,
        batch_id: BatchId,
        notifications: &[Notification],
    ) -> Result<Batch> {
        let mut inner = self.inner.write().await;

        // All-or-nothing under one write lock: reject before any insert.
        for n in notifications {
            if let Some(key) = &n.idempotency_key {
                let collision = inner
                    .notifications
                    .values()
                    .any(|existing| existing.idempotency_key.as_deref() == Some(key.as_str()));
                if collision {
                    return Err(CoreError::Conflict);
                }
            }
        }

        let now = Utc::now();
        let total = notifications.len() as i32;
        let batch = Batch {
            id: batch_id,
            total,
            pending: total,
            sent: 0,
            failed: 0,
            cancelled: 0,
            created_at: now,
            updated_at: now,
        };
        inner.batches.insert(batch_id, batch.clone());
        for n in notifications {
            inner.notifications.insert(n.id, n.clone());
        }

        Ok(batch)
    }

    async fn get_batch(&self, batch_id: BatchId) -> Result<(Batch, Vec<Notification>)> {
        let inner = self.inner.read().await;
        let batch = inner.batches.get(&batch_id).cloned().ok_or(CoreError::NotFound)?;
        let mut children: Vec<Notification> = inner
            .notifications
            .values()
            .filter(|n| n.batch_id == Some(batch_id))
            .cloned()
            .collect();
        children.sort_by_key(|n| n.created_at);
        Ok((batch, children))
    }

    async fn update_batch_counts(&self, batch_id: BatchId) -> Result<()> {
        let mut inner = self.inner.write().await;
        let counts = inner.notifications.values().filter(|n| n.batch_id == Some(batch_id)).fold(
            (0, 0, 0, 0),
            |(pending, sent, failed, cancelled), n| match n.status {
                Status::Pending | Status::Queued | Status::Processing | Status::Scheduled => {
                    (pending + 1, sent, failed, cancelled)
                },
                Status::Sent => (pending, sent + 1, failed, cancelled),
                Status::Failed => (pending, sent, failed + 1, cancelled),
                Status::Cancelled => (pending, sent, failed, cancelled + 1),
            },
        );
        if let Some(batch) = inner.batches.get_mut(&batch_id) {
            batch.pending = counts.0;
            batch.sent = counts.1;
            batch.failed = counts.2;
            batch.cancelled = counts.3;
            batch.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Channel, Priority};

    fn notification(key: Option<&str>) -> Notification {
        let now = Utc::now();
        Notification {
            id: NotificationId::new(),
            batch_id: None,
            channel: Channel::Sms,
            recipient: "+905551234567".to_string(),
            content: "Hello".to_string(),
            priority: Priority::Normal,
            status: Status::Pending,
            idempotency_key: key.map(str::to_string),
            retry_count: 0,
            max_retries: 3,
            next_retry_at: None,
            scheduled_at: None,
            sent_at: None,
            provider_msg_id: None,
            error_message: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn create_and_fetch_round_trip() {
        let store = MemoryStore::new();
        let n = notification(None);
        store.create(&n).await.expect("create should succeed");

        let fetched = store.get_by_id(n.id).await.expect("row should exist");
        assert_eq!(fetched.recipient, n.recipient);
        assert_eq!(fetched.status, Status::Pending);
    }

    #[tokio::test]
    async fn duplicate_idempotency_key_conflicts() {
        let store = MemoryStore::new();
        store.create(&notification(Some("order-42"))).await.expect("first insert");

        let err = store.create(&notification(Some("order-42"))).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict));

        let found = store.get_by_idempotency_key("order-42").await.expect("key lookup");
        assert_eq!(found.idempotency_key.as_deref(), Some("order-42"));
    }

    #[tokio::test]
    async fn due_retries_respect_predicate() {
        let store = MemoryStore::new();

        let mut due = notification(None);
        due.status = Status::Failed;
        due.retry_count = 1;
        due.next_retry_at = Some(Utc::now() - chrono::Duration::seconds(1));
        store.create(&due).await.expect("insert due row");

        let mut future = notification(None);
        future.status = Status::Failed;
        future.retry_count = 1;
        future.next_retry_at = Some(Utc::now() + chrono::Duration::seconds(60));
        store.create(&future).await.expect("insert future row");

        let mut exhausted = notification(None);
        exhausted.status = Status::Failed;
        exhausted.retry_count = 3;
        exhausted.next_retry_at = Some(Utc::now() - chrono::Duration::seconds(1));
        store.create(&exhausted).await.expect("insert exhausted row");

        let rows = store.find_due_retries().await.expect("due query");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, due.id);
    }

    #[tokio::test]
    async fn batch_create_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.create(&notification(Some("taken"))).await.expect("seed row");

        let batch_id = BatchId::new();
        let mut a = notification(None);
        a.batch_id = Some(batch_id);
        let mut b = notification(Some("taken"));
        b.batch_id = Some(batch_id);

        let err = store.create_batch(batch_id, &[a.clone(), b]).await.unwrap_err();
        assert!(matches!(err, CoreError::Conflict));

        // Neither the batch nor any child exists afterwards.
        assert!(matches!(store.get_batch(batch_id).await, Err(CoreError::NotFound)));
        assert!(matches!(store.get_by_id(a.id).await, Err(CoreError::NotFound)));
    }

    #[tokio::test]
    async fn batch_counts_recompute_from_children() {
        let store = MemoryStore::new();
        let batch_id = BatchId::new();

        let mut children = Vec::new();
        for _ in 0..3 {
            let mut n = notification(None);
            n.batch_id = Some(batch_id);
            children.push(n);
        }
        let batch = store.create_batch(batch_id, &children).await.expect("create batch");
        assert_eq!(batch.total, 3);
        assert_eq!(batch.pending, 3);

        store.mark_sent(children[0].id, "msg-1", Utc::now()).await.expect("mark sent");
        store.mark_failed(children[1].id, "boom").await.expect("mark failed");
        store.update_batch_counts(batch_id).await.expect("refresh counts");

        let (batch, rows) = store.get_batch(batch_id).await.expect("get batch");
        assert_eq!(rows.len(), 3);
        assert_eq!(batch.total, 3);
        assert_eq!(batch.pending, 1);
        assert_eq!(batch.sent, 1);
        assert_eq!(batch.failed, 1);
        assert_eq!(batch.cancelled, 0);
    }

    #[tokio::test]
    async fn list_filters_and_paginates() {
        let store = MemoryStore::new();
        for i in 0..5 {
            let mut n = notification(None);
            n.channel = if i % 2 == 0 { Channel::Sms } else { Channel::Email };
            n.created_at = Utc::now() + chrono::Duration::milliseconds(i);
            store.create(&n).await.expect("insert");
        }

        let filter = ListFilter {
            channel: Some(Channel::Sms),
            page: 1,
            limit: 2,
            ..Default::default()
        };
        let (rows, total) = store.list(&filter).await.expect("list");
        assert_eq!(total, 3);
        assert_eq!(rows.len(), 2);
        // Newest first.
        assert!(rows[0].created_at >= rows[1].created_at);
    }
}
