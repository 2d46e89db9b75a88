//! Core domain types for the courier notification dispatcher.
//!
//! Provides the notification and batch models, the status state machine,
//! the error taxonomy shared across the workspace, and the durable store
//! contract with its PostgreSQL and in-memory implementations. The dispatch
//! and API crates depend on these foundational types.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod models;
pub mod storage;
pub mod store;

pub use error::{CoreError, Result};
pub use models::{
    Batch, BatchId, Channel, CreateBatchRequest, CreateNotificationRequest, ListFilter,
    Notification, NotificationId, Priority, Status,
};
pub use store::NotificationStore;
