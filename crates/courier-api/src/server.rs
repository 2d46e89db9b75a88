//! HTTP server wiring.
//!
//! Builds the Axum router with the middleware stack (body limit, request
//! timeout, tracing, correlation IDs) and serves it with graceful shutdown
//! on SIGINT/SIGTERM. Stopping intake is the first step of the process-wide
//! shutdown sequence; the binary drains the worker pool afterwards.

use std::{net::SocketAddr, time::Duration};

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use crate::{config::Config, handlers, middleware::correlation, AppState};

/// Maximum accepted request body size.
const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Builds the router with all routes and middleware.
pub fn create_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/metrics", get(handlers::metrics))
        .route(
            "/api/v1/notifications",
            post(handlers::create).get(handlers::list),
        )
        .route(
            "/api/v1/notifications/batch",
            post(handlers::create_batch),
        )
        .route(
            "/api/v1/notifications/{id}",
            get(handlers::get_by_id).delete(handlers::cancel),
        )
        .route("/api/v1/batches/{id}", get(handlers::get_batch))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(Duration::from_secs(config.write_timeout)))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(correlation::propagate))
        .with_state(state)
}

/// Serves the router until a shutdown signal arrives.
///
/// Returns once the listener has stopped accepting and in-flight requests
/// have drained, so the caller can continue with worker shutdown.
///
/// # Errors
///
/// Returns an error when the port cannot be bound or the server fails.
pub async fn start_server(
    state: AppState,
    config: &Config,
    addr: SocketAddr,
) -> Result<(), std::io::Error> {
    let app = create_router(state, config);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "HTTP server listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Resolves on CTRL+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "failed to install SIGTERM handler");
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received CTRL+C, starting graceful shutdown"),
        () = terminate => info!("received SIGTERM, starting graceful shutdown"),
    }
}
