//! Reconcile: content-version comparison over the eligible mapped universe

use docket_common::db::MappingRecord;
use docket_common::events::SyncEvent;
use std::collections::{BTreeSet, HashMap};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{CaseFailure, RunContext, SyncEngine, LOAD_BATCH_SIZE};
use crate::db::mappings;
use crate::eligibility::is_after_cutoff;
use crate::error::{SyncError, SyncResult};
use crate::models::{CaseField, CaseRecord};
use crate::ports::{BoardSchema, ColumnValues};
use crate::versioning::normalized_value;

/// Board column values for a record. Fields without a board column are left out.
pub(super) fn column_values(record: &CaseRecord, schema: &BoardSchema) -> ColumnValues {
    CaseField::ALL
        .iter()
        .filter_map(|field| {
            schema
                .column(field.column_label())
                .map(|column| (column.id.clone(), normalized_value(record.field(*field))))
        })
        .collect()
}

impl SyncEngine {
    pub(super) async fn reconcile_pass(
        &self,
        run: &mut RunContext,
        universe: &BTreeSet<i64>,
        schema: &BoardSchema,
        cancel: &CancellationToken,
    ) -> SyncResult<()> {
        let mut mapped: HashMap<i64, MappingRecord> =
            mappings::list_for_board(&self.deps.pool, &self.settings.board_id)
                .await?
                .into_iter()
                .map(|m| (m.source_id, m))
                .collect();

        // Cases created this run already carry their current version
        let pending: Vec<i64> = universe
            .iter()
            .copied()
            .filter(|id| !run.onboarded.contains(id))
            .collect();

        info!(run_id = %run.run_id, cases = pending.len(), "Reconciling mapped cases");

        let source = self.deps.source.as_ref();
        for chunk in pending.chunks(LOAD_BATCH_SIZE) {
            let records = self
                .read_with_retry("fetch_by_ids", cancel, move || source.fetch_by_ids(chunk))
                .await?;
            let mut by_id: HashMap<i64, CaseRecord> =
                records.into_iter().map(|r| (r.id, r)).collect();

            for source_id in chunk {
                let Some(record) = by_id.remove(source_id) else {
                    warn!(source_id, "Mapped case missing from source, skipped");
                    continue;
                };
                let Some(mapping) = mapped.remove(source_id) else {
                    continue;
                };
                if !is_after_cutoff(record.created_at, self.settings.cutoff) {
                    run.stats.skipped_ineligible += 1;
                    continue;
                }

                self.before_case(run, cancel).await?;
                if run.breaker.is_open() {
                    run.stats.skipped_circuit_open += 1;
                    continue;
                }
                if let Err(failure) = self
                    .reconcile_case(run, &record, &mapping, schema, cancel)
                    .await
                {
                    self.handle_case_failure(run, record.id, failure).await?;
                }
            }
        }
        Ok(())
    }

    /// Write a changed case to its board item and store the new version
    pub(super) async fn reconcile_case(
        &self,
        run: &mut RunContext,
        record: &CaseRecord,
        mapping: &MappingRecord,
        schema: &BoardSchema,
        cancel: &CancellationToken,
    ) -> Result<(), CaseFailure> {
        let version = self.settings.versioner.version(record);
        if version == mapping.content_version {
            debug!(source_id = record.id, "Content version unchanged");
            run.stats.skipped_unchanged += 1;
            return Ok(());
        }
        if run.written_items.contains(&mapping.item_id) {
            debug!(
                source_id = record.id,
                item_id = %mapping.item_id,
                "Item already written this run"
            );
            run.stats.skipped_duplicate += 1;
            return Ok(());
        }

        record
            .validate()
            .map_err(|msg| CaseFailure::new("validate", SyncError::Validation(msg), 0))?;

        let board = self.deps.board.as_ref();
        let board_id = self.settings.board_id.as_str();
        let item_id = mapping.item_id.as_str();
        let values = column_values(record, schema);
        let values = &values;
        let policy = self.retry.clone();

        self.board_call(run, "update_item_fields", &policy, cancel, move || {
            board.update_item_fields(board_id, item_id, values)
        })
        .await?;

        let name = record.item_name();
        if mapping.item_name.as_deref() != Some(name.as_str()) {
            let name_ref = name.as_str();
            self.board_call(run, "rename_item", &policy, cancel, move || {
                board.rename_item(board_id, item_id, name_ref)
            })
            .await?;
            mappings::update_item_name(&self.deps.pool, record.id, &name)
                .await
                .map_err(|e| CaseFailure::store("persist_mapping", e))?;
        }

        mappings::update_version(&self.deps.pool, record.id, &version, self.now())
            .await
            .map_err(|e| CaseFailure::store("persist_mapping", e))?;

        run.written_items.insert(mapping.item_id.clone());
        run.stats.updated += 1;
        info!(run_id = %run.run_id, source_id = record.id, item_id = %item_id, "Case updated");

        self.resolve_failures(record.id).await;
        self.deps.events.emit_lossy(SyncEvent::CaseUpdated {
            run_id: run.run_id.clone(),
            source_id: record.id,
            item_id: mapping.item_id.clone(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ColumnInfo;

    #[test]
    fn test_column_values_only_for_known_columns() {
        let mut schema = BoardSchema::default();
        for (label, id) in [("Case Number", "text_1"), ("Client Phone", "phone_2")] {
            schema.columns.insert(
                label.to_string(),
                ColumnInfo {
                    id: id.to_string(),
                    allowed_values: Vec::new(),
                },
            );
        }
        let record = CaseRecord {
            id: 1,
            case_number: " 2024-0001 ".to_string(),
            client_phone: Some("+972-50-123-4567".to_string()),
            title: Some("Levi v. Cohen".to_string()),
            ..Default::default()
        };

        let values = column_values(&record, &schema);
        assert_eq!(values.len(), 2);
        assert_eq!(values["text_1"], "2024-0001");
        assert_eq!(values["phone_2"], "0501234567");
    }
}
