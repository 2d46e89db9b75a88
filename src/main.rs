//! Courier notification dispatcher.
//!
//! Process entry point: loads configuration, prepares the database, and
//! starts the dispatch engine (priority queue, worker pool, retry and
//! scheduled schedulers) alongside the HTTP intake server. Shutdown runs in
//! order: stop accepting requests, cancel the workers, join the pool within
//! the configured budget, close the database pool.

use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use courier_api::{AppState, Config};
use courier_core::{storage::PgStore, NotificationStore};
use courier_dispatch::{
    ChannelLimiters, NotificationService, PriorityQueue, Provider, RetryScheduler,
    ScheduledScheduler, WebhookProvider, WorkerPool,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    init_tracing(&config);

    info!(
        database_url = %config.database_url_masked(),
        http_port = config.http_port,
        workers = config.worker_count(),
        "starting courier"
    );

    // ---- database ----
    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_conns)
        .min_connections(config.db_min_conns)
        .acquire_timeout(Duration::from_secs(10))
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;
    info!("database migrations applied");

    // ---- metrics ----
    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install metrics recorder")?;

    // ---- core dependencies ----
    let store: Arc<dyn NotificationStore> = Arc::new(PgStore::new(pool.clone()));
    let queue = Arc::new(PriorityQueue::new());
    let limiters = Arc::new(ChannelLimiters::new(config.rate_limit_per_channel));
    let provider: Arc<dyn Provider> = Arc::new(WebhookProvider::new(
        config.provider_base_url.clone(),
        Duration::from_secs(config.provider_timeout),
    )?);
    let service = Arc::new(NotificationService::new(store.clone(), queue.clone()));

    // ---- background engine ----
    // One root token fans out to the worker pool and both schedulers.
    let cancel = CancellationToken::new();

    let mut worker_pool = WorkerPool::new(
        config.worker_count(),
        queue.clone(),
        store.clone(),
        provider,
        limiters,
        config.backoff(),
        cancel.clone(),
    );
    worker_pool.spawn_workers();

    let retry_scheduler = RetryScheduler::new(
        store.clone(),
        queue.clone(),
        Duration::from_secs(config.retry_interval),
        cancel.clone(),
    );
    tokio::spawn(retry_scheduler.run());

    let scheduled_scheduler = ScheduledScheduler::new(
        store.clone(),
        queue.clone(),
        Duration::from_secs(config.scheduler_interval),
        cancel.clone(),
    );
    tokio::spawn(scheduled_scheduler.run());

    // ---- HTTP server (blocks until shutdown signal) ----
    let state = AppState::new(service, queue, Some(prometheus));
    let addr = config.server_addr()?;
    courier_api::start_server(state, &config, addr)
        .await
        .context("HTTP server failed")?;

    // ---- graceful shutdown ----
    info!("intake stopped; draining workers");
    cancel.cancel();
    worker_pool
        .shutdown_graceful(Duration::from_secs(config.shutdown_timeout))
        .await
        .context("worker pool shutdown failed")?;

    pool.close().await;
    info!("courier stopped cleanly");
    Ok(())
}

/// Initializes structured logging from `RUST_LOG` or the configured filter.
fn init_tracing(config: &Config) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.rust_log.clone()));

    tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(true)).init();
}
