//! Hearing pass
//!
//! Planned steps are applied one at a time through the resilience layer. The
//! snapshot and the mapping's hearing checksum are written only after every
//! step succeeded, so a failure part way through leaves the last known good
//! state in place and the next run resumes from it.

use docket_common::db::MappingRecord;
use std::collections::{BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{CaseFailure, RunContext, SyncEngine, HEARING_STATUS_COLUMN, LOAD_BATCH_SIZE};
use crate::db::{hearings, mappings};
use crate::error::{SyncError, SyncResult};
use crate::hearing::{plan_hearing_update, select_nearest_hearings, snapshot_of, HearingStep};
use crate::models::NearestHearing;
use crate::resilience::RetryPolicy;
use crate::versioning::hearing_checksum;

impl SyncEngine {
    pub(super) async fn hearing_pass(
        &self,
        run: &mut RunContext,
        universe: &BTreeSet<i64>,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        if universe.is_empty() {
            return Ok(());
        }

        let mut mapped: HashMap<i64, MappingRecord> =
            mappings::list_for_board(&self.deps.pool, &self.settings.board_id)
                .await?
                .into_iter()
                .map(|m| (m.source_id, m))
                .collect();

        let ids: Vec<i64> = universe.iter().copied().collect();
        let source = self.deps.source.as_ref();
        let mut events = Vec::new();
        for chunk in ids.chunks(LOAD_BATCH_SIZE) {
            let batch = self
                .read_with_retry("fetch_hearing_events", cancel, move || {
                    source.fetch_hearing_events(chunk)
                })
                .await?;
            events.extend(batch);
        }

        let nearest = select_nearest_hearings(&events, self.now().naive_utc());
        debug!(
            run_id = %run.run_id,
            events = events.len(),
            cases_with_hearing = nearest.len(),
            "Selected nearest hearings"
        );

        for (source_id, hearing) in &nearest {
            if !universe.contains(source_id) {
                continue;
            }
            let Some(mapping) = mapped.remove(source_id) else {
                continue;
            };

            self.before_case(run, cancel).await?;
            if run.breaker.is_open() {
                run.stats.skipped_circuit_open += 1;
                continue;
            }
            if let Err(failure) = self.reconcile_hearing(run, &mapping, hearing, cancel).await {
                self.handle_case_failure(run, *source_id, failure).await?;
            }
        }
        Ok(())
    }

    /// Bring one item's hearing fields in line with its nearest hearing
    async fn reconcile_hearing(
        &self,
        run: &mut RunContext,
        mapping: &MappingRecord,
        hearing: &NearestHearing,
        cancel: &CancellationToken,
    ) -> Result<(), CaseFailure> {
        let checksum = hearing_checksum(hearing);
        if mapping.hearing_checksum.as_deref() == Some(checksum.as_str()) {
            return Ok(());
        }

        let pool = &self.deps.pool;
        let board_id = self.settings.board_id.as_str();
        let prior = hearings::get_snapshot(pool, mapping.source_id, board_id)
            .await
            .map_err(|e| CaseFailure::store("load_hearing_snapshot", e))?;
        let steps = plan_hearing_update(hearing, prior.as_ref());

        if !steps.is_empty() {
            self.check_status_labels(&steps, cancel).await?;

            let policy = self.retry.clone();
            for step in &steps {
                self.apply_hearing_step(run, &mapping.item_id, step, &policy, cancel)
                    .await?;
            }
        }

        let now = self.now();
        hearings::upsert_snapshot(pool, &snapshot_of(hearing, board_id, now))
            .await
            .map_err(|e| CaseFailure::store("persist_hearing_snapshot", e))?;
        mappings::update_hearing_checksum(pool, mapping.source_id, &checksum, now)
            .await
            .map_err(|e| CaseFailure::store("persist_mapping", e))?;

        if !steps.is_empty() {
            run.stats.hearing_updates += 1;
            info!(
                run_id = %run.run_id,
                source_id = mapping.source_id,
                item_id = %mapping.item_id,
                status = %hearing.status,
                steps = steps.len(),
                "Hearing updated"
            );
            self.resolve_failures(mapping.source_id).await;
        }
        Ok(())
    }

    /// Every status label about to be written must be one the board accepts
    async fn check_status_labels(
        &self,
        steps: &[HearingStep],
        cancel: &CancellationToken,
    ) -> Result<(), CaseFailure> {
        if !steps.iter().any(|s| matches!(s, HearingStep::SetStatus(_))) {
            return Ok(());
        }

        let metadata = self.deps.metadata.as_ref();
        let board_id = self.settings.board_id.as_str();
        let ttl = self.settings.metadata_ttl;
        let allowed = self
            .read_with_retry("fetch_board_metadata", cancel, move || {
                metadata.allowed_values(board_id, HEARING_STATUS_COLUMN, ttl)
            })
            .await
            .map_err(|e| CaseFailure::new("fetch_board_metadata", e, 0))?;

        // Free-form column
        if allowed.is_empty() {
            return Ok(());
        }
        for step in steps {
            if let HearingStep::SetStatus(status) = step {
                let label = status.board_label();
                if !allowed.iter().any(|v| v == label) {
                    return Err(CaseFailure::new(
                        step.operation(),
                        SyncError::Validation(format!(
                            "hearing status '{}' is not an allowed value of '{}'",
                            label, HEARING_STATUS_COLUMN
                        )),
                        0,
                    ));
                }
            }
        }
        Ok(())
    }

    async fn apply_hearing_step(
        &self,
        run: &mut RunContext,
        item_id: &str,
        step: &HearingStep,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<(), CaseFailure> {
        let board = self.deps.board.as_ref();
        let board_id = self.settings.board_id.as_str();
        let operation = step.operation();

        match step {
            HearingStep::SetStatus(status) => {
                let label = status.board_label();
                self.board_call(run, operation, policy, cancel, move || {
                    board.set_hearing_status(board_id, item_id, label)
                })
                .await
            }
            HearingStep::UpdateJudgeCity { judge, city } => {
                let judge = judge.as_deref();
                let city = city.as_deref();
                self.board_call(run, operation, policy, cancel, move || {
                    board.update_hearing_location(board_id, item_id, judge, city)
                })
                .await
            }
            HearingStep::UpdateDateTime(starts_at) => {
                let starts_at = *starts_at;
                self.board_call(run, operation, policy, cancel, move || {
                    board.update_hearing_date(board_id, item_id, starts_at)
                })
                .await
            }
        }
    }
}
