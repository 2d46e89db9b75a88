//! Worker pool lifecycle management.
//!
//! Spawns the configured number of homogeneous workers over one shared
//! queue and joins them on shutdown. Any worker serves any channel; the
//! per-channel distinction lives in the rate limiter and the notification
//! itself.

use std::{sync::Arc, time::Duration};

use courier_core::NotificationStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::{
    error::{DispatchError, Result},
    limiter::ChannelLimiters,
    provider::Provider,
    queue::PriorityQueue,
    worker::Worker,
};

/// Supervises the dispatch workers.
pub struct WorkerPool {
    worker_count: usize,
    queue: Arc<PriorityQueue>,
    store: Arc<dyn NotificationStore>,
    provider: Arc<dyn Provider>,
    limiters: Arc<ChannelLimiters>,
    backoff: Arc<[Duration]>,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a pool that will run `worker_count` workers once spawned.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        worker_count: usize,
        queue: Arc<PriorityQueue>,
        store: Arc<dyn NotificationStore>,
        provider: Arc<dyn Provider>,
        limiters: Arc<ChannelLimiters>,
        backoff: Vec<Duration>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            worker_count,
            queue,
            store,
            provider,
            limiters,
            backoff: backoff.into(),
            cancel,
            handles: Vec::new(),
        }
    }

    /// Launches all workers. Returns immediately; workers run until the
    /// cancellation token fires.
    pub fn spawn_workers(&mut self) {
        info!(worker_count = self.worker_count, "spawning dispatch workers");

        for worker_id in 0..self.worker_count {
            let worker = Worker::new(
                worker_id,
                self.queue.clone(),
                self.store.clone(),
                self.provider.clone(),
                self.limiters.clone(),
                self.backoff.clone(),
                self.cancel.clone(),
            );
            self.handles.push(tokio::spawn(worker.run()));
        }
    }

    /// Signals cancellation and waits for every worker to return.
    ///
    /// Each worker finishes settling its current item if possible, or bails
    /// at its next cancellation-aware suspension point. Rows caught
    /// mid-flight keep their persisted status and are recovered by the
    /// schedulers after restart.
    ///
    /// # Errors
    ///
    /// Returns `ShutdownTimeout` if the pool does not drain within
    /// `timeout`.
    pub async fn shutdown_graceful(mut self, timeout: Duration) -> Result<()> {
        info!(
            worker_count = self.handles.len(),
            timeout_secs = timeout.as_secs(),
            "initiating graceful worker shutdown"
        );

        self.cancel.cancel();

        let handles = std::mem::take(&mut self.handles);
        let join_all = async {
            for (worker_id, handle) in handles.into_iter().enumerate() {
                if let Err(join_error) = handle.await {
                    let err = DispatchError::WorkerPanic {
                        worker_id,
                        message: join_error.to_string(),
                    };
                    error!(worker_id, error = %err, "worker task panicked during shutdown");
                }
            }
        };

        match tokio::time::timeout(timeout, join_all).await {
            Ok(()) => {
                info!("worker pool shutdown completed");
                Ok(())
            },
            Err(_) => {
                error!(
                    timeout_secs = timeout.as_secs(),
                    "worker shutdown timed out, some workers may still be running"
                );
                Err(DispatchError::ShutdownTimeout { timeout })
            },
        }
    }

    /// Whether any worker task is still running.
    pub fn has_active_workers(&self) -> bool {
        self.handles.iter().any(|h| !h.is_finished())
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        let active = self.handles.iter().filter(|h| !h.is_finished()).count();
        if active > 0 && !self.cancel.is_cancelled() {
            warn!(
                active_workers = active,
                "worker pool dropped without shutdown_graceful; cancelling workers"
            );
            self.cancel.cancel();
        }
    }
}
