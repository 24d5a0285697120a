//! Bootstrap: onboard newly eligible cases

use docket_common::db::MappingRecord;
use docket_common::events::SyncEvent;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::cases::column_values;
use super::{CaseFailure, RunContext, SyncEngine};
use crate::db::mappings;
use crate::error::{SyncError, SyncResult};
use crate::models::{CaseField, CaseRecord};
use crate::ports::{BoardSchema, ItemState};

/// What the duplicate guard found on the board
enum ExistingItem {
    None,
    Active(String),
    Inactive(String, ItemState),
}

impl SyncEngine {
    pub(super) async fn bootstrap_pass(
        &self,
        run: &mut RunContext,
        schema: &BoardSchema,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let source = self.deps.source.as_ref();
        let cutoff = self.settings.cutoff;

        let records = self
            .read_with_retry("fetch_created_since", cancel, move || {
                source.fetch_created_since(cutoff)
            })
            .await?;
        let mapped = mappings::list_source_ids(&self.deps.pool, &self.settings.board_id).await?;
        let today = self.now().date_naive();

        let selection = self
            .settings
            .bootstrap_policy()
            .select_candidates(records, &mapped, today);

        for (source_id, eligible_on) in &selection.cooling {
            debug!(source_id, eligible_on = %eligible_on, "Case still cooling");
        }
        run.stats.skipped_ineligible += (selection.cooling.len() + selection.ineligible.len()) as i64;

        info!(
            run_id = %run.run_id,
            eligible = selection.eligible.len(),
            cooling = selection.cooling.len(),
            ineligible = selection.ineligible.len(),
            already_mapped = selection.already_mapped,
            "Bootstrap candidates selected"
        );

        for record in &selection.eligible {
            self.before_case(run, cancel).await?;
            if run.breaker.is_open() {
                run.stats.skipped_circuit_open += 1;
                continue;
            }
            if let Err(failure) = self.onboard_case(run, record, schema, cancel).await {
                self.handle_case_failure(run, record.id, failure).await?;
            }
        }
        Ok(())
    }

    /// Create the board item and mapping for one eligible case, or adopt an
    /// active item that already carries its case number
    pub(super) async fn onboard_case(
        &self,
        run: &mut RunContext,
        record: &CaseRecord,
        schema: &BoardSchema,
        cancel: &CancellationToken,
    ) -> Result<(), CaseFailure> {
        record
            .validate()
            .map_err(|msg| CaseFailure::new("validate", SyncError::Validation(msg), 0))?;

        let version = self.settings.versioner.version(record);

        match self.find_existing_item(run, record, schema, cancel).await? {
            ExistingItem::Active(item_id) => {
                info!(
                    run_id = %run.run_id,
                    source_id = record.id,
                    item_id = %item_id,
                    "Adopting existing board item for unmapped case"
                );
                // Empty version forces the reconcile step to write current values
                let mapping = self.new_mapping(record, &item_id, String::new(), None);
                mappings::insert(&self.deps.pool, &mapping)
                    .await
                    .map_err(|e| CaseFailure::store("insert_mapping", e))?;
                run.stats.skipped_duplicate += 1;
                return Ok(());
            }
            ExistingItem::Inactive(item_id, state) => {
                debug!(
                    source_id = record.id,
                    item_id = %item_id,
                    state = ?state,
                    "Ignoring inactive board item, creating a new one"
                );
            }
            ExistingItem::None => {}
        }

        let board = self.deps.board.as_ref();
        let board_id = self.settings.board_id.as_str();
        let name = record.item_name();
        let name_ref = name.as_str();
        let values = column_values(record, schema);
        let values = &values;

        // Creation is never retried blindly
        let policy = self.retry.single_attempt();
        let item_id = self
            .board_call(run, "create_item", &policy, cancel, move || {
                board.create_item(board_id, name_ref, values)
            })
            .await?;

        let mapping = self.new_mapping(record, &item_id, version, Some(name));
        if let Err(e) = mappings::insert(&self.deps.pool, &mapping).await {
            warn!(
                source_id = record.id,
                item_id = %item_id,
                error = %e,
                "Board item created but mapping insert failed"
            );
            return Err(CaseFailure::store("insert_mapping", e));
        }

        run.written_items.insert(item_id.clone());
        run.onboarded.insert(record.id);
        run.stats.created += 1;
        info!(run_id = %run.run_id, source_id = record.id, item_id = %item_id, "Case onboarded");

        self.resolve_failures(record.id).await;
        self.deps.events.emit_lossy(SyncEvent::CaseCreated {
            run_id: run.run_id.clone(),
            source_id: record.id,
            item_id,
        });
        Ok(())
    }

    async fn find_existing_item(
        &self,
        run: &mut RunContext,
        record: &CaseRecord,
        schema: &BoardSchema,
        cancel: &CancellationToken,
    ) -> Result<ExistingItem, CaseFailure> {
        let label = CaseField::CaseNumber.column_label();
        let Some(column) = schema.column(label) else {
            warn!(column = label, "Board has no case number column, duplicate guard skipped");
            return Ok(ExistingItem::None);
        };

        let board = self.deps.board.as_ref();
        let board_id = self.settings.board_id.as_str();
        let column_id = column.id.as_str();
        let case_number = record.case_number.trim();
        let policy = self.retry.clone();

        let found = self
            .board_call(run, "find_item_by_value", &policy, cancel, move || {
                board.find_item_by_value(board_id, column_id, case_number)
            })
            .await?;
        let Some(item_id) = found else {
            return Ok(ExistingItem::None);
        };

        let item = item_id.as_str();
        let state = self
            .board_call(run, "item_state", &policy, cancel, move || {
                board.item_state(board_id, item)
            })
            .await?;

        Ok(if state.is_active() {
            ExistingItem::Active(item_id)
        } else {
            ExistingItem::Inactive(item_id, state)
        })
    }

    fn new_mapping(
        &self,
        record: &CaseRecord,
        item_id: &str,
        content_version: String,
        item_name: Option<String>,
    ) -> MappingRecord {
        let now = self.now();
        let written = item_name.is_some();
        MappingRecord {
            source_id: record.id,
            case_number: record.case_number.trim().to_string(),
            item_id: item_id.to_string(),
            board_id: self.settings.board_id.clone(),
            item_name,
            source_created_on: record.created_at.map(|ts| ts.date()),
            created_at: now,
            last_synced_to_board_at: written.then_some(now),
            last_synced_from_board_at: None,
            content_version,
            hearing_checksum: None,
        }
    }
}
