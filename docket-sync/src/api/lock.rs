//! Run lock endpoint

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use docket_common::db::RunLockHolder;
use serde::Serialize;

use super::AppState;
use crate::error::ApiResult;
use crate::resilience::run_lock;

#[derive(Debug, Serialize)]
pub struct LockResponse {
    pub held: bool,
    pub holder: Option<RunLockHolder>,
}

/// GET /api/lock
///
/// An expired holder is reported as not held.
pub async fn get_lock(State(state): State<AppState>) -> ApiResult<Json<LockResponse>> {
    let holder = run_lock::current_holder(&state.db, Utc::now()).await?;
    Ok(Json(LockResponse {
        held: holder.is_some(),
        holder,
    }))
}
