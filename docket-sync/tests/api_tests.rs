//! Integration tests for the operator API
//!
//! Tests cover:
//! - Health endpoint
//! - Run metrics listing and latest run
//! - Dead-letter log filtering
//! - Run lock view

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use chrono::{Duration, TimeZone, Utc};
use docket_common::db::{init_memory_database, RunMetrics};
use docket_sync::db::failures::{self, NewFailure};
use docket_sync::db::metrics;
use docket_sync::resilience::run_lock;
use docket_sync::{build_router, AppState};
use http_body_util::BodyExt; // for `collect`
use serde_json::Value;
use sqlx::SqlitePool;
use tower::util::ServiceExt; // for `oneshot` method

async fn setup_app() -> (axum::Router, SqlitePool) {
    let db = init_memory_database()
        .await
        .expect("Should create in-memory database");
    (build_router(AppState::new(db.clone())), db)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn extract_json(body: Body) -> Value {
    let bytes = body
        .collect()
        .await
        .expect("Should read body")
        .to_bytes();
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

fn run(run_id: &str, day: u32, created: i64) -> RunMetrics {
    let started_at = Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap();
    RunMetrics {
        run_id: run_id.to_string(),
        started_at,
        finished_at: started_at + Duration::seconds(4),
        duration_ms: 4000,
        created,
        ..Default::default()
    }
}

fn failure(source_id: i64, operation: &str) -> NewFailure {
    NewFailure {
        run_id: "run-1".to_string(),
        source_id: Some(source_id),
        operation: operation.to_string(),
        error_class: "permanent".to_string(),
        message: "HTTP 400: bad value".to_string(),
        trace: None,
        attempts: 1,
        created_at: Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap(),
    }
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let (app, _db) = setup_app().await;

    let response = app.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["module"], "docket-sync");
    assert!(json["version"].is_string());
}

// =============================================================================
// Runs
// =============================================================================

#[tokio::test]
async fn test_latest_run_not_found_when_empty() {
    let (app, _db) = setup_app().await;

    let response = app.oneshot(get("/api/runs/latest")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = extract_json(response.into_body()).await;
    assert_eq!(json["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_runs_listed_newest_first() {
    let (app, db) = setup_app().await;
    metrics::insert_run_metrics(&db, &run("run-a", 1, 3)).await.unwrap();
    metrics::insert_run_metrics(&db, &run("run-b", 2, 0)).await.unwrap();
    metrics::insert_run_metrics(&db, &run("run-c", 3, 1)).await.unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/runs?limit=2"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = extract_json(response.into_body()).await;
    let runs = json.as_array().unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0]["run_id"], "run-c");
    assert_eq!(runs[1]["run_id"], "run-b");

    let response = app.oneshot(get("/api/runs/latest")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["run_id"], "run-c");
    assert_eq!(json["created"], 1);
}

#[tokio::test]
async fn test_runs_zero_limit_rejected() {
    let (app, _db) = setup_app().await;

    let response = app.oneshot(get("/api/runs?limit=0")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

// =============================================================================
// Failures
// =============================================================================

#[tokio::test]
async fn test_failures_filtered_to_unresolved() {
    let (app, db) = setup_app().await;
    failures::record(&db, &failure(1, "update_item")).await.unwrap();
    failures::record(&db, &failure(2, "create_item")).await.unwrap();
    failures::resolve_for_source(&db, 1, Utc::now()).await.unwrap();

    let response = app
        .clone()
        .oneshot(get("/api/failures?unresolved=true"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["unresolved_total"], 1);
    let entries = json["failures"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["source_id"], 2);
    assert_eq!(entries[0]["operation"], "create_item");

    let response = app.oneshot(get("/api/failures")).await.unwrap();
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["failures"].as_array().unwrap().len(), 2);
}

// =============================================================================
// Lock
// =============================================================================

#[tokio::test]
async fn test_lock_reports_live_holder() {
    let (app, db) = setup_app().await;

    let response = app.clone().oneshot(get("/api/lock")).await.unwrap();
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["held"], false);
    assert!(json["holder"].is_null());

    assert!(run_lock::try_acquire(&db, "run-9", Utc::now(), Duration::minutes(30))
        .await
        .unwrap());

    let response = app.oneshot(get("/api/lock")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = extract_json(response.into_body()).await;
    assert_eq!(json["held"], true);
    assert_eq!(json["holder"]["holder"], "run-9");
}
