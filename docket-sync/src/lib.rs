//! docket-sync library
//!
//! One-way reconciliation of source-of-record cases onto a task board:
//! bootstrap discovery, content-versioned updates, the hearing
//! sub-state-machine, the resilience layer and deduplicated alerting.

pub mod alerts;
pub mod api;
pub mod db;
pub mod eligibility;
pub mod error;
pub mod fixtures;
pub mod hearing;
pub mod metadata;
pub mod models;
pub mod ports;
pub mod reconcile;
pub mod resilience;
pub mod scheduler;
pub mod versioning;

pub use api::{build_router, AppState};
pub use error::{ApiError, ErrorClass, SyncError, SyncResult};
pub use reconcile::{ReprocessOutcome, RunOutcome, SyncDeps, SyncEngine, SyncSettings};
