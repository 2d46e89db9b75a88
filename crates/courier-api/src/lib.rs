//! HTTP surface for the courier dispatcher.
//!
//! Maps the service operations onto REST endpoints with one-to-one error
//! translation, plus health and Prometheus scrape endpoints. Also owns
//! configuration loading for the binary.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod handlers;
pub mod middleware;
pub mod server;

use std::sync::Arc;

use courier_dispatch::{NotificationService, PriorityQueue};
use metrics_exporter_prometheus::PrometheusHandle;

pub use config::Config;
pub use server::{create_router, start_server};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Intake service coordinating the store and the queue.
    pub service: Arc<NotificationService>,
    /// Queue handle for the depth gauges on the metrics endpoint.
    pub queue: Arc<PriorityQueue>,
    /// Prometheus render handle; absent in tests without a recorder.
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates the state shared across handlers.
    pub fn new(
        service: Arc<NotificationService>,
        queue: Arc<PriorityQueue>,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        Self { service, queue, prometheus }
    }
}
