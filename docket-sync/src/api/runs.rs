//! Run metrics endpoints

use axum::extract::{Query, State};
use axum::Json;
use docket_common::db::RunMetrics;
use serde::Deserialize;

use super::AppState;
use crate::db::metrics;
use crate::error::{ApiError, ApiResult};

const DEFAULT_LIMIT: u32 = 20;
const MAX_LIMIT: u32 = 500;

#[derive(Debug, Deserialize)]
pub struct RunsQuery {
    pub limit: Option<u32>,
}

/// GET /api/runs?limit=N
///
/// Most recent runs first.
pub async fn list_runs(
    State(state): State<AppState>,
    Query(query): Query<RunsQuery>,
) -> ApiResult<Json<Vec<RunMetrics>>> {
    let limit = match query.limit {
        Some(0) => return Err(ApiError::BadRequest("limit must be >= 1".to_string())),
        Some(limit) => limit.min(MAX_LIMIT),
        None => DEFAULT_LIMIT,
    };
    Ok(Json(metrics::list_recent(&state.db, limit).await?))
}

/// GET /api/runs/latest
pub async fn latest_run(State(state): State<AppState>) -> ApiResult<Json<RunMetrics>> {
    metrics::latest(&state.db)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("no completed runs".to_string()))
}
