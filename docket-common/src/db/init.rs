//! Database initialization
//!
//! Creates the state database on first run and brings the schema up to date.
//! Every statement is idempotent, so this is safe to call on every startup.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

pub const SCHEMA_VERSION: i64 = 1;

/// Open (or create) the state database and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    sqlx::query("PRAGMA foreign_keys = ON").execute(&pool).await?;
    // Concurrent readers (operator API) alongside the single writer
    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// In-memory database with the full schema, for tests and dry runs.
///
/// Limited to one connection: each SQLite memory connection is its own database.
pub async fn init_memory_database() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await?;

    create_schema(&pool).await?;
    Ok(pool)
}

/// Create every table used by the engine
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;
    create_case_mappings_table(pool).await?;
    create_hearing_snapshots_table(pool).await?;
    create_run_lock_table(pool).await?;
    create_failure_log_table(pool).await?;
    create_run_metrics_table(pool).await?;
    create_alert_dedup_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per onboarded case; `source_id` is never reused
async fn create_case_mappings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS case_mappings (
            source_id INTEGER PRIMARY KEY,
            case_number TEXT NOT NULL,
            item_id TEXT NOT NULL,
            board_id TEXT NOT NULL,
            item_name TEXT,
            source_created_on TEXT,
            created_at TEXT NOT NULL,
            last_synced_to_board_at TEXT,
            last_synced_from_board_at TEXT,
            content_version TEXT NOT NULL,
            hearing_checksum TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_case_mappings_item ON case_mappings(board_id, item_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_hearing_snapshots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hearing_snapshots (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_id INTEGER NOT NULL,
            board_id TEXT NOT NULL,
            starts_at TEXT NOT NULL,
            status INTEGER NOT NULL,
            judge TEXT,
            city TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE (source_id, board_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Singleton row (id = 1); a NULL holder means the lock is free
async fn create_run_lock_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_lock (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            holder TEXT,
            acquired_at TEXT,
            expires_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("INSERT OR IGNORE INTO run_lock (id, holder) VALUES (1, NULL)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_failure_log_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS failure_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL,
            source_id INTEGER,
            operation TEXT NOT NULL,
            error_class TEXT NOT NULL,
            message TEXT NOT NULL,
            trace TEXT,
            attempts INTEGER NOT NULL,
            resolved INTEGER NOT NULL DEFAULT 0,
            resolved_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_failure_log_source ON failure_log(source_id, resolved)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_run_metrics_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS run_metrics (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            duration_ms INTEGER NOT NULL,
            created INTEGER NOT NULL DEFAULT 0,
            updated INTEGER NOT NULL DEFAULT 0,
            skipped_unchanged INTEGER NOT NULL DEFAULT 0,
            skipped_ineligible INTEGER NOT NULL DEFAULT 0,
            skipped_duplicate INTEGER NOT NULL DEFAULT 0,
            skipped_circuit_open INTEGER NOT NULL DEFAULT 0,
            failed INTEGER NOT NULL DEFAULT 0,
            hearing_updates INTEGER NOT NULL DEFAULT 0,
            breaker_tripped INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_alert_dedup_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS alert_dedup (
            fingerprint TEXT PRIMARY KEY,
            exception_type TEXT NOT NULL,
            source_component TEXT NOT NULL,
            sample_message TEXT NOT NULL,
            first_seen_at TEXT NOT NULL,
            last_seen_at TEXT NOT NULL,
            occurrence_count INTEGER NOT NULL DEFAULT 1,
            last_sent_at TEXT,
            suppressed_since_send INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
