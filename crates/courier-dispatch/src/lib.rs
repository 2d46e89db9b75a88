//! Dispatch engine for the courier notification service.
//!
//! Ties the notification lifecycle together: intake lands rows in the store
//! and admits them to a bounded three-tier priority queue; a pool of
//! homogeneous workers dequeues, throttles per channel, delivers through the
//! external provider, and settles each row as sent, retry-scheduled, or
//! terminally failed. Two background schedulers re-admit persisted rows
//! (due retries and due scheduled deliveries), so all timing state survives
//! restarts.
//!
//! ```text
//! intake ──> service ──> store ──> priority queue ──> worker ──> limiter ──> provider
//!                          ▲                                        │
//!                          │    retry / scheduled schedulers        │
//!                          └────────────(due rows)◄─────────────────┘ settle
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod limiter;
pub mod metrics;
pub mod provider;
pub mod queue;
pub mod scheduler;
pub mod service;
pub mod worker;
pub mod worker_pool;

pub use error::{DispatchError, Result};
pub use limiter::ChannelLimiters;
pub use provider::{Provider, ProviderReceipt, WebhookProvider};
pub use queue::{Item, PriorityQueue};
pub use scheduler::{RetryScheduler, ScheduledScheduler};
pub use service::NotificationService;
pub use worker_pool::WorkerPool;

/// Default retry backoff sequence: first, second, and third retry delays.
/// Attempts beyond the sequence reuse the last entry.
pub const DEFAULT_BACKOFF_SECS: [u64; 3] = [5, 30, 120];
