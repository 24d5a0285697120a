//! Operator HTTP API
//!
//! Read-only views over run metrics, the dead-letter log and the run lock.

pub mod failures;
pub mod health;
pub mod lock;
pub mod runs;

use axum::routing::get;
use axum::Router;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub use health::health_routes;

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(db: SqlitePool) -> Self {
        Self {
            db,
            started_at: Utc::now(),
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/runs", get(runs::list_runs))
        .route("/api/runs/latest", get(runs::latest_run))
        .route("/api/failures", get(failures::list_failures))
        .route("/api/lock", get(lock::get_lock));

    Router::new()
        .merge(api)
        .merge(health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
