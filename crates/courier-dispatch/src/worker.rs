//! Dispatch worker.
//!
//! Each worker is an independent consumer of the shared priority queue. Per
//! item: fetch the fresh row, gate on the per-channel rate limiter, send via
//! the provider, then settle the row as sent, retry-scheduled, or terminally
//! failed. Workers are stateless across items; every decision is derived
//! from the store.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use courier_core::{CoreError, Notification, NotificationStore, Status};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    limiter::ChannelLimiters,
    metrics,
    provider::Provider,
    queue::{Item, PriorityQueue},
};

/// Single queue consumer. Spawned and supervised by the worker pool.
pub struct Worker {
    id: usize,
    queue: Arc<PriorityQueue>,
    store: Arc<dyn NotificationStore>,
    provider: Arc<dyn Provider>,
    limiters: Arc<ChannelLimiters>,
    backoff: Arc<[Duration]>,
    cancel: CancellationToken,
}

impl Worker {
    /// Creates a worker sharing the engine's queue, store, provider, and
    /// limiters.
    pub fn new(
        id: usize,
        queue: Arc<PriorityQueue>,
        store: Arc<dyn NotificationStore>,
        provider: Arc<dyn Provider>,
        limiters: Arc<ChannelLimiters>,
        backoff: Arc<[Duration]>,
        cancel: CancellationToken,
    ) -> Self {
        Self { id, queue, store, provider, limiters, backoff, cancel }
    }

    /// Processes queue items until the cancellation token fires.
    pub async fn run(self) {
        info!(worker_id = self.id, "worker started");
        loop {
            let Some(item) = self.queue.dequeue(&self.cancel).await else {
                info!(worker_id = self.id, "worker stopping");
                return;
            };
            self.process(item).await;
        }
    }

    async fn process(&self, item: Item) {
        let start = tokio::time::Instant::now();

        let notification = match self.store.get_by_id(item.notification_id).await {
            Ok(n) => n,
            Err(CoreError::NotFound) => {
                // Row was deleted after enqueue; nothing to dispatch.
                warn!(
                    worker_id = self.id,
                    notification_id = %item.notification_id,
                    "queued notification no longer exists"
                );
                return;
            },
            Err(err) => {
                error!(
                    worker_id = self.id,
                    notification_id = %item.notification_id,
                    error = %err,
                    "failed to fetch notification"
                );
                return;
            },
        };

        // A cancel request may have raced the dispatch; skip silently.
        if notification.status == Status::Cancelled {
            debug!(
                worker_id = self.id,
                notification_id = %notification.id,
                "notification was cancelled before processing"
            );
            return;
        }

        if let Err(err) = self.store.update_status(notification.id, Status::Processing).await {
            error!(
                worker_id = self.id,
                notification_id = %notification.id,
                error = %err,
                "failed to mark notification as processing"
            );
            return;
        }

        // Token acquisition and the provider call both race the worker's
        // cancellation token; on shutdown the row stays in `processing` and
        // is recovered out of band.
        tokio::select! {
            () = self.cancel.cancelled() => return,
            () = self.limiters.acquire(notification.channel) => {},
        }

        let result = tokio::select! {
            () = self.cancel.cancelled() => return,
            result = self.provider.send(&notification) => result,
        };

        let elapsed = start.elapsed();
        match result {
            Ok(receipt) => {
                let now = Utc::now();
                if let Err(err) =
                    self.store.mark_sent(notification.id, &receipt.message_id, now).await
                {
                    error!(
                        worker_id = self.id,
                        notification_id = %notification.id,
                        error = %err,
                        "failed to mark notification as sent"
                    );
                    return;
                }

                // Counter refresh is fire-and-forget; drift self-heals on
                // the next recompute from the child rows.
                if let Some(batch_id) = notification.batch_id {
                    let store = self.store.clone();
                    tokio::spawn(async move {
                        if let Err(err) = store.update_batch_counts(batch_id).await {
                            warn!(
                                batch_id = %batch_id,
                                error = %err,
                                "failed to update batch counts"
                            );
                        }
                    });
                }

                metrics::record_sent(notification.channel, elapsed);
                info!(
                    worker_id = self.id,
                    notification_id = %notification.id,
                    provider_msg_id = %receipt.message_id,
                    latency_ms = elapsed.as_millis() as u64,
                    "notification sent"
                );
            },
            Err(err) => {
                warn!(
                    worker_id = self.id,
                    notification_id = %notification.id,
                    retry_count = notification.retry_count,
                    error = %err,
                    "provider send failed"
                );
                self.handle_failure(&notification, &err.to_string()).await;
                metrics::record_failed(notification.channel);
            },
        }
    }

    /// Schedules a retry while budget remains, otherwise marks the
    /// notification permanently failed.
    ///
    /// The retry delay is `backoff[retry_count]`, clamped to the last entry
    /// for attempts beyond the configured sequence.
    async fn handle_failure(&self, notification: &Notification, send_error: &str) {
        if notification.retry_count >= notification.max_retries {
            if let Err(err) = self.store.mark_failed(notification.id, send_error).await {
                error!(
                    worker_id = self.id,
                    notification_id = %notification.id,
                    error = %err,
                    "failed to mark notification as failed"
                );
            }
            return;
        }

        let idx = (notification.retry_count as usize).min(self.backoff.len().saturating_sub(1));
        let delay = self.backoff.get(idx).copied().unwrap_or(Duration::from_secs(5));
        let next_retry_at = Utc::now() + delay;

        if let Err(err) = self
            .store
            .schedule_retry(
                notification.id,
                notification.retry_count + 1,
                next_retry_at,
                send_error,
            )
            .await
        {
            error!(
                worker_id = self.id,
                notification_id = %notification.id,
                error = %err,
                "failed to schedule retry"
            );
        }
    }
}
