//! Persisted record models

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable link between one source case and one board item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRecord {
    pub source_id: i64,
    pub case_number: String,
    pub item_id: String,
    pub board_id: String,
    /// Item name last written to the board
    pub item_name: Option<String>,
    /// Source creation date, the cutoff gate
    pub source_created_on: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub last_synced_to_board_at: Option<DateTime<Utc>>,
    pub last_synced_from_board_at: Option<DateTime<Utc>>,
    pub content_version: String,
    pub hearing_checksum: Option<String>,
}

/// Last hearing state written to the board for one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HearingSnapshot {
    pub source_id: i64,
    pub board_id: String,
    pub starts_at: NaiveDateTime,
    /// 0 = active, 1 = cancelled, 2 = transferred
    pub status: i32,
    pub judge: Option<String>,
    pub city: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Current holder of the singleton run lock
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunLockHolder {
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// One failed per-case operation (dead-letter entry)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub id: i64,
    pub run_id: String,
    pub source_id: Option<i64>,
    pub operation: String,
    pub error_class: String,
    pub message: String,
    pub trace: Option<String>,
    pub attempts: u32,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate outcome of one run, written once at completion
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub created: i64,
    pub updated: i64,
    pub skipped_unchanged: i64,
    pub skipped_ineligible: i64,
    pub skipped_duplicate: i64,
    pub skipped_circuit_open: i64,
    pub failed: i64,
    pub hearing_updates: i64,
    pub breaker_tripped: bool,
}

/// Dedup state of one alert fingerprint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertDedupRecord {
    pub fingerprint: String,
    pub exception_type: String,
    pub source_component: String,
    pub sample_message: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub occurrence_count: i64,
    pub last_sent_at: Option<DateTime<Utc>>,
    pub suppressed_since_send: i64,
}
