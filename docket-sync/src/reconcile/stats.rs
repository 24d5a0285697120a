//! Per-run outcome counters

use chrono::{DateTime, Utc};
use docket_common::db::RunMetrics;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    pub created: i64,
    pub updated: i64,
    pub skipped_unchanged: i64,
    /// Not eligible yet (cooling) or ever (no creation date, before cutoff)
    pub skipped_ineligible: i64,
    /// Existing item adopted, or item already written this pass
    pub skipped_duplicate: i64,
    /// Abandoned because the breaker was open
    pub skipped_circuit_open: i64,
    pub failed: i64,
    pub hearing_updates: i64,
    pub breaker_tripped: bool,
}

impl RunStats {
    pub fn to_metrics(
        &self,
        run_id: &str,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
    ) -> RunMetrics {
        RunMetrics {
            run_id: run_id.to_string(),
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0),
            created: self.created,
            updated: self.updated,
            skipped_unchanged: self.skipped_unchanged,
            skipped_ineligible: self.skipped_ineligible,
            skipped_duplicate: self.skipped_duplicate,
            skipped_circuit_open: self.skipped_circuit_open,
            failed: self.failed,
            hearing_updates: self.hearing_updates,
            breaker_tripped: self.breaker_tripped,
        }
    }
}
