//! PostgreSQL-backed store.
//!
//! All SQL for notifications and batches lives here; nothing outside this
//! module issues queries. Idempotency-key uniqueness is enforced by a unique
//! index, so concurrent intake with the same key resolves to exactly one row
//! without a read-then-write race. `updated_at` is bumped by a trigger
//! installed in the migrations.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::{
    error::Result,
    models::{Batch, BatchId, ListFilter, Notification, NotificationId, Status},
    store::{NotificationStore, DUE_QUERY_LIMIT},
};

const NOTIFICATION_COLUMNS: &str = "id, batch_id, channel, recipient, content, priority, status, \
     idempotency_key, retry_count, max_retries, next_retry_at, scheduled_at, \
     sent_at, provider_msg_id, error_message, created_at, updated_at";

/// Store backed by a PostgreSQL connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: Arc<PgPool>,
}

impl PgStore {
    /// Creates a new store sharing the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool: Arc::new(pool) }
    }

    /// Verifies database connectivity with a trivial query. Used by the
    /// readiness probe.
    pub async fn health_check(&self) -> Result<()> {
        let _: (i32,) = sqlx::query_as("SELECT 1").fetch_one(&*self.pool).await?;
        Ok(())
    }

    fn push_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ListFilter) {
        let mut sep = " WHERE ";
        if let Some(status) = filter.status {
            qb.push(sep).push("status = ").push_bind(status);
            sep = " AND ";
        }
        if let Some(channel) = filter.channel {
            qb.push(sep).push("channel = ").push_bind(channel);
            sep = " AND ";
        }
        if let Some(from) = filter.from {
            qb.push(sep).push("created_at >= ").push_bind(from);
            sep = " AND ";
        }
        if let Some(to) = filter.to {
            qb.push(sep).push("created_at <= ").push_bind(to);
        }
    }

    async fn insert_notification<'e, E>(executor: E, n: &Notification) -> Result<()>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, batch_id, channel, recipient, content, priority, status,
                 idempotency_key, retry_count, max_retries, scheduled_at,
                 created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(n.id)
        .bind(n.batch_id)
        .bind(n.channel)
        .bind(&n.recipient)
        .bind(&n.content)
        .bind(n.priority)
        .bind(n.status)
        .bind(&n.idempotency_key)
        .bind(n.retry_count)
        .bind(n.max_retries)
        .bind(n.scheduled_at)
        .bind(n.created_at)
        .bind(n.updated_at)
        .execute(executor)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl NotificationStore for PgStore {
    async fn create(&self, notification: &Notification) -> Result<()> {
        Self::insert_notification(&*self.pool, notification).await
    }

    async fn get_by_id(&self, id: NotificationId) -> Result<Notification> {
        let n = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE id = $1"
        ))
        .bind(id)
        .fetch_one(&*self.pool)
        .await?;

        Ok(n)
    }

    async fn get_by_idempotency_key(&self, key: &str) -> Result<Notification> {
        let n = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications WHERE idempotency_key = $1"
        ))
        .bind(key)
        .fetch_one(&*self.pool)
        .await?;

        Ok(n)
    }

    async fn list(&self, filter: &ListFilter) -> Result<(Vec<Notification>, i64)> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM notifications");
        Self::push_filters(&mut count_query, filter);
        let total: i64 = count_query.build_query_scalar().fetch_one(&*self.pool).await?;

        let offset = (filter.page - 1) * filter.limit;
        let mut page_query = QueryBuilder::<Postgres>::new(format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications"
        ));
        Self::push_filters(&mut page_query, filter);
        page_query.push(" ORDER BY created_at DESC LIMIT ");
        page_query.push_bind(filter.limit);
        page_query.push(" OFFSET ");
        page_query.push_bind(offset);

        let rows =
            page_query.build_query_as::<Notification>().fetch_all(&*self.pool).await?;

        Ok((rows, total))
    }

    async fn update_status(&self, id: NotificationId, status: Status) -> Result<()> {
        sqlx::query("UPDATE notifications SET status = $1 WHERE id = $2")
            .bind(status)
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    async fn mark_sent(
        &self,
        id: NotificationId,
        provider_msg_id: &str,
        sent_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'sent', provider_msg_id = $1, sent_at = $2, error_message = NULL
            WHERE id = $3
            "#,
        )
        .bind(provider_msg_id)
        .bind(sent_at)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn mark_failed(&self, id: NotificationId, error_message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'failed', error_message = $1, next_retry_at = NULL
            WHERE id = $2
            "#,
        )
        .bind(error_message)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn schedule_retry(
        &self,
        id: NotificationId,
        retry_count: i32,
        next_retry_at: DateTime<Utc>,
        error_message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE notifications
            SET status = 'failed', retry_count = $1, next_retry_at = $2, error_message = $3
            WHERE id = $4
            "#,
        )
        .bind(retry_count)
        .bind(next_retry_at)
        .bind(error_message)
        .bind(id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }

    async fn cancel(&self, id: NotificationId) -> Result<()> {
        sqlx::query("UPDATE notifications SET status = 'cancelled' WHERE id = $1")
            .bind(id)
            .execute(&*self.pool)
            .await?;

        Ok(())
    }

    async fn find_due_retries(&self) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE status = 'failed'
              AND retry_count < max_retries
              AND next_retry_at <= NOW()
            ORDER BY next_retry_at ASC
            LIMIT $1
            "#
        ))
        .bind(DUE_QUERY_LIMIT)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows)
    }

    async fn find_due_scheduled(&self) -> Result<Vec<Notification>> {
        let rows = sqlx::query_as::<_, Notification>(&format!(
            r#"
            SELECT {NOTIFICATION_COLUMNS} FROM notifications
            WHERE status = 'scheduled'
              AND scheduled_at <= NOW()
            ORDER BY scheduled_at ASC
            LIMIT $1
            "#
        ))
        .bind(DUE_QUERY_LIMIT)
        .fetch_all(&*self.pool)
        .await?;

        Ok(rows)
    }

    async fn create_batch(
        &self,
        batch_id: BatchId,
        notifications: &[Notification],
    ) -> Result<Batch> {
        let mut tx = self.pool.begin().await?;

        let now = Utc::now();
        let total = i32::try_from(notifications.len()).unwrap_or(i32::MAX);
        let batch = sqlx::query_as::<_, Batch>(
            r#"
            INSERT INTO batches (id, total, pending, sent, failed, cancelled, created_at, updated_at)
            VALUES ($1, $2, $3, 0, 0, 0, $4, $4)
            RETURNING id, total, pending, sent, failed, cancelled, created_at, updated_at
            "#,
        )
        .bind(batch_id)
        .bind(total)
        .bind(total)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        for n in notifications {
            Self::insert_notification(&mut *tx, n).await?;
        }

        tx.commit().await?;

        Ok(batch)
    }

    async fn get_batch(&self, batch_id: BatchId) -> Result<(Batch, Vec<Notification>)> {
        let batch = sqlx::query_as::<_, Batch>(
            "SELECT id, total, pending, sent, failed, cancelled, created_at, updated_at \
             FROM batches WHERE id = $1",
        )
        .bind(batch_id)
        .fetch_one(&*self.pool)
        .await?;

        let children = sqlx::query_as::<_, Notification>(&format!(
            "SELECT {NOTIFICATION_COLUMNS} FROM notifications \
             WHERE batch_id = $1 ORDER BY created_at ASC"
        ))
        .bind(batch_id)
        .fetch_all(&*self.pool)
        .await?;

        Ok((batch, children))
    }

    async fn update_batch_counts(&self, batch_id: BatchId) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE batches b
            SET pending   = (SELECT COUNT(*) FROM notifications
                             WHERE batch_id = b.id
                               AND status IN ('pending', 'queued', 'processing', 'scheduled')),
                sent      = (SELECT COUNT(*) FROM notifications
                             WHERE batch_id = b.id AND status = 'sent'),
                failed    = (SELECT COUNT(*) FROM notifications
                             WHERE batch_id = b.id AND status = 'failed'),
                cancelled = (SELECT COUNT(*) FROM notifications
                             WHERE batch_id = b.id AND status = 'cancelled')
            WHERE id = $1
            "#,
        )
        .bind(batch_id)
        .execute(&*self.pool)
        .await?;

        Ok(())
    }
}
