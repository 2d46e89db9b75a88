//! Background schedulers re-admitting persisted rows to the queue.
//!
//! Two identically-shaped tick loops: the retry scheduler polls failed rows
//! whose `next_retry_at` has arrived, the scheduled scheduler polls deferred
//! rows whose `scheduled_at` has arrived. Both enqueue each due row with its
//! own priority and then mark it `queued`. Persisting the due timestamps
//! means both survive restarts.
//!
//! A full tier skips the row; it is re-picked on the next tick with no
//! status change. A status update racing a concurrent cancel is benign: the
//! worker re-checks status before dispatching.

use std::{sync::Arc, time::Duration};

use courier_core::{Notification, NotificationStore, Status};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::queue::{Item, PriorityQueue};

fn item_for(notification: &Notification) -> Item {
    Item {
        notification_id: notification.id,
        channel: notification.channel,
        priority: notification.priority,
    }
}

async fn readmit(store: &dyn NotificationStore, queue: &PriorityQueue, due: Vec<Notification>) {
    let count = due.len();
    for notification in due {
        if let Err(err) = queue.enqueue(item_for(&notification)) {
            warn!(
                notification_id = %notification.id,
                error = %err,
                "could not enqueue due notification"
            );
            continue;
        }

        if let Err(err) = store.update_status(notification.id, Status::Queued).await {
            error!(
                notification_id = %notification.id,
                error = %err,
                "failed to update status after enqueue"
            );
        }
    }

    if count > 0 {
        info!(count, "enqueued due notifications");
    }
}

/// Polls failed rows whose retry time has arrived and re-admits them.
pub struct RetryScheduler {
    store: Arc<dyn NotificationStore>,
    queue: Arc<PriorityQueue>,
    interval: Duration,
    cancel: CancellationToken,
}

impl RetryScheduler {
    /// Creates a scheduler ticking at `interval`.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        queue: Arc<PriorityQueue>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self { store, queue, interval, cancel }
    }

    /// Ticks until the cancellation token fires. Poll errors are logged and
    /// the loop continues on the next tick.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = self.interval.as_secs(), "retry scheduler started");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("retry scheduler stopping");
                    return;
                },
                _ = ticker.tick() => self.poll().await,
            }
        }
    }

    async fn poll(&self) {
        match self.store.find_due_retries().await {
            Ok(due) => readmit(self.store.as_ref(), &self.queue, due).await,
            Err(err) => error!(error = %err, "retry poll error"),
        }
    }
}

/// Polls deferred rows whose scheduled time has arrived and admits them.
pub struct ScheduledScheduler {
    store: Arc<dyn NotificationStore>,
    queue: Arc<PriorityQueue>,
    interval: Duration,
    cancel: CancellationToken,
}

impl ScheduledScheduler {
    /// Creates a scheduler ticking at `interval`.
    pub fn new(
        store: Arc<dyn NotificationStore>,
        queue: Arc<PriorityQueue>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self { store, queue, interval, cancel }
    }

    /// Ticks until the cancellation token fires.
    pub async fn run(self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_secs = self.interval.as_secs(), "scheduled scheduler started");
        loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("scheduled scheduler stopping");
                    return;
                },
                _ = ticker.tick() => self.poll().await,
            }
        }
    }

    async fn poll(&self) {
        match self.store.find_due_scheduled().await {
            Ok(due) => readmit(self.store.as_ref(), &self.queue, due).await,
            Err(err) => error!(error = %err, "scheduler poll error"),
        }
    }
}
