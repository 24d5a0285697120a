//! Shared harness for engine integration tests
//!
//! Builds a `SyncEngine` over in-memory SQLite and the fixture collaborators,
//! with a settable clock and zero backoff delays.

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use docket_common::events::EventBus;
use docket_common::db::init_memory_database;
use docket_sync::fixtures::{FixtureSource, MemoryBoard, StaticMetadata};
use docket_sync::metadata::MetadataCache;
use docket_sync::models::{CaseRecord, HearingEvent};
use docket_sync::reconcile::{RunOutcome, RunStats};
use docket_sync::resilience::RetryPolicy;
use docket_sync::versioning::ContentVersioner;
use docket_sync::{SyncDeps, SyncEngine, SyncSettings};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const BOARD_ID: &str = "board-1";

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(y: i32, m: u32, d: u32, h: u32) -> NaiveDateTime {
    date(y, m, d).and_hms_opt(h, 0, 0).unwrap()
}

/// Monday 2024-06-03 09:00 UTC
pub fn default_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 9, 0, 0).unwrap()
}

pub fn case(id: i64, created: Option<NaiveDateTime>) -> CaseRecord {
    CaseRecord {
        id,
        case_number: format!("2024-{:04}", id),
        created_at: created,
        title: Some(format!("Levi v. Cohen {}", id)),
        client_phone: Some("050-1234567".to_string()),
        claim_amount: Some(Decimal::new(150_000, 2)),
        ..Default::default()
    }
}

pub fn hearing(event_id: i64, case_id: i64, starts_at: NaiveDateTime, code: i32) -> HearingEvent {
    HearingEvent {
        event_id,
        case_id: Some(case_id),
        starts_at: Some(starts_at),
        status_code: code,
        judge: Some("Judge Dayan".to_string()),
        city: Some("Haifa".to_string()),
    }
}

pub fn settings() -> SyncSettings {
    SyncSettings {
        board_id: BOARD_ID.to_string(),
        cutoff: date(2024, 1, 1),
        cooling_business_days: 0,
        max_attempts: 3,
        breaker_threshold: 5,
        run_lock_ttl: chrono::Duration::minutes(30),
        metadata_ttl: Duration::from_secs(600),
        versioner: ContentVersioner::default(),
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delays: [Duration::ZERO; 3],
        jitter: 0.0,
        retry_after_cap: Duration::ZERO,
    }
}

pub struct Harness {
    pub pool: SqlitePool,
    pub source: Arc<FixtureSource>,
    pub board: Arc<MemoryBoard>,
    pub events: EventBus,
    pub clock: Arc<Mutex<DateTime<Utc>>>,
    pub engine: Arc<SyncEngine>,
    pub cancel: CancellationToken,
}

impl Harness {
    pub async fn new(cases: Vec<CaseRecord>) -> Self {
        Self::with_settings(cases, settings()).await
    }

    pub async fn with_settings(cases: Vec<CaseRecord>, settings: SyncSettings) -> Self {
        let pool = init_memory_database().await.unwrap();
        let source = Arc::new(FixtureSource::new(cases, Vec::new()));
        let board = Arc::new(MemoryBoard::new());
        let events = EventBus::new(256);
        let clock = Arc::new(Mutex::new(default_now()));

        let deps = SyncDeps {
            pool: pool.clone(),
            source: source.clone(),
            board: board.clone(),
            metadata: Arc::new(MetadataCache::new(Arc::new(StaticMetadata::standard()))),
            events: events.clone(),
        };
        let max_attempts = settings.max_attempts;
        let engine_clock = clock.clone();
        let engine = SyncEngine::new(deps, settings)
            .with_retry_policy(fast_retry(max_attempts))
            .with_clock(Arc::new(move || *engine_clock.lock().unwrap()));
        let engine = Arc::new(engine);

        Self {
            pool,
            source,
            board,
            events,
            clock,
            engine,
            cancel: CancellationToken::new(),
        }
    }

    pub fn set_now(&self, now: DateTime<Utc>) {
        *self.clock.lock().unwrap() = now;
    }

    /// Full pass that must complete
    pub async fn run(&self) -> RunStats {
        match self.engine.run_once(&self.cancel).await.unwrap() {
            RunOutcome::Completed { stats, .. } => stats,
            other => panic!("expected a completed run, got {:?}", other),
        }
    }

    pub async fn run_hearings(&self) -> RunStats {
        match self.engine.run_hearings(&self.cancel).await.unwrap() {
            RunOutcome::Completed { stats, .. } => stats,
            other => panic!("expected a completed run, got {:?}", other),
        }
    }
}
