//! docket-sync - case to task board reconciliation service
//!
//! Default mode runs the periodic scheduler, the alert delivery task and the
//! operator HTTP API until Ctrl-C. `--once` runs a single full pass and
//! `--reprocess` handles one case, both without starting the API.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use docket_common::config::{self, TomlConfig};
use docket_common::db::init_database;
use docket_common::events::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use docket_sync::alerts::{AlertGate, AlertNotifier, AlertPolicy, LogTransport};
use docket_sync::fixtures::{FixtureSource, MemoryBoard, StaticMetadata};
use docket_sync::metadata::MetadataCache;
use docket_sync::scheduler::Scheduler;
use docket_sync::{build_router, AppState, ReprocessOutcome, RunOutcome, SyncDeps, SyncEngine, SyncSettings};

#[derive(Parser, Debug)]
#[command(name = "docket-sync")]
#[command(about = "Reconciles source-of-record cases onto a task board")]
#[command(version)]
struct Args {
    /// Configuration file
    #[arg(short, long, env = config::CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Folder holding docket-sync.db
    #[arg(short, long, env = config::ROOT_ENV_VAR)]
    root_folder: Option<PathBuf>,

    /// JSON fixture served as the source of record
    #[arg(long)]
    fixture: Option<PathBuf>,

    /// Run one full pass and exit
    #[arg(long, conflicts_with = "reprocess")]
    once: bool,

    /// Reprocess one case by its case number and exit
    #[arg(long, value_name = "CASE_NUMBER")]
    reprocess: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    init_tracing(&config)?;
    info!("Starting docket-sync v{}", env!("CARGO_PKG_VERSION"));

    let settings = SyncSettings::from_config(&config.sync).context("Invalid [sync] configuration")?;

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &config);
    let db_path = config::database_path(&root_folder);
    info!("Database: {}", db_path.display());
    let pool = init_database(&db_path)
        .await
        .context("Failed to open state database")?;

    let source = match &args.fixture {
        Some(path) => FixtureSource::load(path)
            .with_context(|| format!("Failed to load fixture {}", path.display()))?,
        None => {
            warn!("No --fixture given, source of record is empty");
            FixtureSource::default()
        }
    };
    let deps = SyncDeps {
        pool: pool.clone(),
        source: Arc::new(source),
        board: Arc::new(MemoryBoard::new()),
        metadata: Arc::new(MetadataCache::new(Arc::new(StaticMetadata::standard()))),
        events: EventBus::new(256),
    };
    let engine = Arc::new(SyncEngine::new(deps, settings));

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    if let Some(case_number) = &args.reprocess {
        return reprocess(&engine, case_number, &cancel).await;
    }
    if args.once {
        return run_once(&engine, &cancel).await;
    }

    let gate = Arc::new(AlertGate::new(pool.clone(), AlertPolicy::from(&config.alerts)));
    let (notifier, worker) = AlertNotifier::new(
        config.alerts.queue_capacity,
        gate,
        Arc::new(LogTransport),
        pool.clone(),
        Duration::from_secs(config.alerts.summary_interval_secs.max(1)),
    );
    let worker_task = tokio::spawn(worker.run(cancel.clone()));

    let scheduler = Scheduler::new(engine.clone(), notifier, &config.sync, &config.alerts);
    let scheduler_task = tokio::spawn(scheduler.run(cancel.clone()));

    let app = build_router(AppState::new(pool));
    let listener = tokio::net::TcpListener::bind(&config.http.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.http.bind))?;
    info!("Listening on http://{}", config.http.bind);
    info!("Health check: http://{}/health", config.http.bind);

    let server_cancel = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await
        .context("Server error")?;

    if let Err(e) = scheduler_task.await {
        error!("Scheduler task failed: {}", e);
    }
    if let Err(e) = worker_task.await {
        error!("Alert worker task failed: {}", e);
    }

    info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &TomlConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .context("Invalid log filter")?;

    match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

async fn run_once(engine: &SyncEngine, cancel: &CancellationToken) -> Result<()> {
    match engine.run_once(cancel).await? {
        RunOutcome::Skipped { holder } => {
            info!("Run skipped, lock held by {}", holder.as_deref().unwrap_or("unknown"))
        }
        RunOutcome::Completed { run_id, stats } => info!(
            "Run {} completed: {} created, {} updated, {} failed",
            run_id, stats.created, stats.updated, stats.failed
        ),
    }
    Ok(())
}

async fn reprocess(engine: &SyncEngine, case_number: &str, cancel: &CancellationToken) -> Result<()> {
    match engine.reprocess_case(case_number, cancel).await? {
        ReprocessOutcome::Skipped { holder } => warn!(
            "Reprocess skipped, lock held by {}",
            holder.as_deref().unwrap_or("unknown")
        ),
        ReprocessOutcome::UnknownCase => warn!("Case {} not found in source", case_number),
        ReprocessOutcome::Ineligible(reason) => {
            warn!("Case {} not eligible: {:?}", case_number, reason)
        }
        ReprocessOutcome::Processed { run_id, stats } => info!(
            "Case {} reprocessed in run {}: {} created, {} updated, {} failed",
            case_number, run_id, stats.created, stats.updated, stats.failed
        ),
    }
    Ok(())
}

async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl-C, shutting down"),
        _ = terminate => info!("Received terminate signal, shutting down"),
    }
    cancel.cancel();
}
