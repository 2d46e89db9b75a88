//! Bounded in-memory priority queue.
//!
//! Three independent FIFO channels, one per priority tier. Producers (intake
//! and the schedulers) never block: a full tier rejects immediately with
//! `QueueFull` and the row stays in its persisted status. Consumers block in
//! `dequeue` until an item arrives or shutdown is signalled.
//!
//! Buffer sizes reflect expected traffic ratios: high must never accumulate,
//! so its small buffer applies back-pressure quickly; normal carries the bulk
//! of traffic; low is background work.

use courier_core::{Channel, CoreError, NotificationId, Priority};
use tokio_util::sync::CancellationToken;

/// Default capacity of the high tier.
pub const HIGH_CAPACITY: usize = 1000;
/// Default capacity of the normal tier.
pub const NORMAL_CAPACITY: usize = 5000;
/// Default capacity of the low tier.
pub const LOW_CAPACITY: usize = 2000;

/// Minimal payload carried through the queue.
///
/// Workers fetch the full notification from the store at dispatch time, so
/// the queue never holds stale copies of mutable rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Item {
    /// Row to dispatch.
    pub notification_id: NotificationId,
    /// Delivery channel, used for rate limiting.
    pub channel: Channel,
    /// Tier this item was admitted to.
    pub priority: Priority,
}

struct Tier {
    tx: async_channel::Sender<Item>,
    rx: async_channel::Receiver<Item>,
}

impl Tier {
    fn bounded(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity);
        Self { tx, rx }
    }
}

/// Three-tier bounded handoff between producers and the worker pool.
pub struct PriorityQueue {
    high: Tier,
    normal: Tier,
    low: Tier,
}

impl PriorityQueue {
    /// Creates a queue with the default tier capacities.
    pub fn new() -> Self {
        Self::with_capacities(HIGH_CAPACITY, NORMAL_CAPACITY, LOW_CAPACITY)
    }

    /// Creates a queue with explicit tier capacities. Tests use tiny
    /// capacities to exercise the overflow path.
    pub fn with_capacities(high: usize, normal: usize, low: usize) -> Self {
        Self { high: Tier::bounded(high), normal: Tier::bounded(normal), low: Tier::bounded(low) }
    }

    fn tier(&self, priority: Priority) -> &Tier {
        match priority {
            Priority::High => &self.high,
            Priority::Normal => &self.normal,
            Priority::Low => &self.low,
        }
    }

    /// Places an item on its priority tier without blocking.
    ///
    /// Returns `QueueFull` immediately when the target tier is saturated;
    /// the caller decides how to react (intake leaves the row `pending`,
    /// schedulers skip and re-pick on the next tick).
    pub fn enqueue(&self, item: Item) -> Result<(), CoreError> {
        self.tier(item.priority).tx.try_send(item).map_err(|_| CoreError::QueueFull)
    }

    /// Blocks until an item is available or `cancel` fires.
    ///
    /// Priority guarantee, in two steps:
    /// 1. A non-blocking receive drains the high tier first. If an item is
    ///    waiting there it is returned regardless of normal/low backlog.
    /// 2. Only when high is empty does the consumer enter a multi-way wait
    ///    across all three tiers plus the cancellation signal, so it sleeps
    ///    instead of spinning.
    ///
    /// Returns `None` when `cancel` fires (graceful shutdown).
    pub async fn dequeue(&self, cancel: &CancellationToken) -> Option<Item> {
        if let Ok(item) = self.high.rx.try_recv() {
            return Some(item);
        }

        tokio::select! {
            biased;

            () = cancel.cancelled() => None,
            Ok(item) = self.high.rx.recv() => Some(item),
            Ok(item) = self.normal.rx.recv() => Some(item),
            Ok(item) = self.low.rx.recv() => Some(item),
        }
    }

    /// Snapshot of items waiting per tier, for the queue-depth gauges.
    pub fn depths(&self) -> (usize, usize, usize) {
        (self.high.rx.len(), self.normal.rx.len(), self.low.rx.len())
    }
}

impl Default for PriorityQueue {
    fn default() -> Self {
        Self::new()
    }
}
