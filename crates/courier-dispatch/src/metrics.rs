//! Dispatch metrics.
//!
//! Thin wrappers over the `metrics` macros so workers and handlers record
//! the same instrument names. The Prometheus recorder is installed by the
//! binary at startup; without one these calls are no-ops, which keeps tests
//! free of global state.

use std::time::Duration;

use courier_core::Channel;
use metrics::{counter, gauge, histogram};

use crate::queue::PriorityQueue;

/// Records a successful delivery and its dequeue-to-ack latency.
pub fn record_sent(channel: Channel, latency: Duration) {
    counter!("notifications_sent_total", "channel" => channel.as_str()).increment(1);
    histogram!("notification_dispatch_seconds", "channel" => channel.as_str())
        .record(latency.as_secs_f64());
}

/// Records a provider failure.
pub fn record_failed(channel: Channel) {
    counter!("notifications_failed_total", "channel" => channel.as_str()).increment(1);
}

/// Refreshes the per-tier queue depth gauges from a live snapshot.
pub fn record_queue_depths(queue: &PriorityQueue) {
    let (high, normal, low) = queue.depths();
    gauge!("queue_depth_high").set(high as f64);
    gauge!("queue_depth_normal").set(normal as f64);
    gauge!("queue_depth_low").set(low as f64);
}
