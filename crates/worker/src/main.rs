use std::sync::Arc;

use agora_worker::{
    config::Config,
    events,
    jobs::{JobFrequency, JobScheduler, PoolMetricsJob, SuccessionRepairJob},
    logging, telemetry,
};
use anyhow::Result;
use persistence::PgStore;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::load()?;
    logging::init_logging(&config.logging);

    info!("Starting Agora worker v{}", env!("CARGO_PKG_VERSION"));

    telemetry::init_metrics(&config.metrics)?;

    let pool = persistence::create_pool(&config.database.pool_config()).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let store = PgStore::new(pool.clone());
    let (sink, dispatcher) = events::channel();
    let dispatcher_handle = dispatcher.spawn();

    let mut scheduler = JobScheduler::new();
    scheduler.register(SuccessionRepairJob::new(
        store,
        Arc::new(sink),
        config.jobs.repair_batch_size,
        JobFrequency::Seconds(config.jobs.repair_interval_secs),
    ));
    scheduler.register(PoolMetricsJob::new(
        pool.clone(),
        JobFrequency::Seconds(config.jobs.pool_metrics_interval_secs),
    ));
    scheduler.start();

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    let timeout = config.jobs.shutdown_timeout();
    scheduler.shutdown();
    // Consuming the scheduler drops the jobs and with them the last event sink.
    scheduler.wait_for_shutdown(timeout).await;

    match tokio::time::timeout(timeout, dispatcher_handle).await {
        Ok(Ok(dispatched)) => info!(dispatched, "Event dispatcher drained"),
        Ok(Err(e)) => warn!(error = %e, "Event dispatcher task failed"),
        Err(_) => warn!("Event dispatcher did not drain in time"),
    }

    pool.close().await;
    info!("Worker stopped");
    Ok(())
}
