//! Dead-letter log endpoint

use axum::extract::{Query, State};
use axum::Json;
use docket_common::db::FailureRecord;
use serde::Serialize;

use super::AppState;
use crate::db::failures::{self, FailureQuery};
use crate::error::ApiResult;

#[derive(Debug, Serialize)]
pub struct FailuresResponse {
    pub unresolved_total: i64,
    pub failures: Vec<FailureRecord>,
}

/// GET /api/failures?unresolved=true&source_id=&limit=
pub async fn list_failures(
    State(state): State<AppState>,
    Query(query): Query<FailureQuery>,
) -> ApiResult<Json<FailuresResponse>> {
    let failures = failures::list(&state.db, &query).await?;
    let unresolved_total = failures::count_unresolved(&state.db).await?;
    Ok(Json(FailuresResponse {
        unresolved_total,
        failures,
    }))
}
