//! Clip pipeline worker binary.
//!
//! Runs the job executor and the upload schedule due-scan loop in one
//! process, sharing a single job store and progress hub.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use clipcast_queue::{JobStore, MemoryJobStore, Orchestrator, ProgressHub, RedisJobStore};
use clipcast_scheduler::{JsonFileScheduleStore, Scheduler, SchedulerConfig, SystemClock};
use clipcast_worker::{Executor, QueueSubmitter, WorkerConfig};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("clipcast=info,clipcast_worker=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_ansi(true).with_target(true))
            .with(env_filter)
            .init();
    }

    info!("Starting clipcast-worker");

    let config = WorkerConfig::from_env();
    info!("Worker config: {:?}", config);

    // Redis-backed queue when configured, in-process otherwise.
    let job_store: Arc<dyn JobStore> = match std::env::var("REDIS_URL") {
        Ok(url) => match RedisJobStore::new(&url) {
            Ok(store) => {
                info!("Using Redis job store");
                Arc::new(store)
            }
            Err(e) => {
                error!("Failed to open Redis job store: {e}");
                std::process::exit(1);
            }
        },
        Err(_) => {
            info!("REDIS_URL not set, using in-memory job store");
            MemoryJobStore::shared()
        }
    };

    let schedule_path =
        std::env::var("SCHEDULE_FILE").unwrap_or_else(|_| "data/schedules.json".to_string());
    if let Some(parent) = Path::new(&schedule_path).parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            error!("Failed to create schedule directory: {e}");
            std::process::exit(1);
        }
    }
    let schedule_store = match JsonFileScheduleStore::open(&schedule_path).await {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Failed to open schedule store at {schedule_path}: {e}");
            std::process::exit(1);
        }
    };

    let hub = ProgressHub::new();
    let orchestrator = Arc::new(Orchestrator::new(Arc::clone(&job_store), hub.clone()));

    let scheduler = Scheduler::new(
        schedule_store,
        Arc::new(QueueSubmitter::new(Arc::clone(&orchestrator))),
        Arc::new(SystemClock),
        SchedulerConfig::from_env(),
    );

    let executor = Executor::with_noop_adapters(Arc::clone(&job_store), hub.clone(), config);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    tokio::join!(
        executor.run(shutdown_rx.clone()),
        scheduler.run(shutdown_rx),
    );

    info!("Worker shutdown complete");
}
