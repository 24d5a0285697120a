//! Collaborator interfaces
//!
//! The engine talks to the source-of-record database and the task board only
//! through these traits. Concrete clients are supplied by the deployment;
//! `crate::fixtures` provides file- and memory-backed implementations.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::error::{BoardError, SourceError};
use crate::models::{CaseRecord, HearingEvent};

/// Read-only access to the source-of-record database
#[async_trait]
pub trait SourceReader: Send + Sync {
    /// Cases created on or after `since`
    async fn fetch_created_since(&self, since: NaiveDate) -> Result<Vec<CaseRecord>, SourceError>;

    /// Full records for `ids`. Unknown ids are omitted from the result.
    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<CaseRecord>, SourceError>;

    /// Candidate hearing events for the given cases
    async fn fetch_hearing_events(&self, case_ids: &[i64])
        -> Result<Vec<HearingEvent>, SourceError>;

    /// Resolve a human-readable case number to its source id
    async fn resolve_case_number(&self, case_number: &str) -> Result<Option<i64>, SourceError>;

    /// Ids of cases created on or after `since`
    async fn list_ids_created_since(&self, since: NaiveDate) -> Result<BTreeSet<i64>, SourceError>;

    /// Ids of cases modified on or after `since`. Diagnostic only; never a sync trigger.
    async fn list_ids_modified_since(
        &self,
        since: NaiveDateTime,
    ) -> Result<BTreeSet<i64>, SourceError>;
}

/// Write-back channel into the source system
#[async_trait]
pub trait SourceWriter: Send + Sync {
    /// Append an immutable annotation to a case
    async fn append_annotation(&self, case_id: i64, text: &str) -> Result<(), SourceError>;
}

/// Lifecycle state of a board item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemState {
    Active,
    Archived,
    Deleted,
}

impl ItemState {
    pub fn is_active(&self) -> bool {
        matches!(self, ItemState::Active)
    }
}

/// Column values keyed by column id
pub type ColumnValues = BTreeMap<String, String>;

/// Task board API
///
/// Every call except `create_item` is safe to retry. Creation is
/// de-duplicated by the caller through the mapping table.
#[async_trait]
pub trait BoardClient: Send + Sync {
    /// Create an item; returns its id
    async fn create_item(
        &self,
        board_id: &str,
        name: &str,
        values: &ColumnValues,
    ) -> Result<String, BoardError>;

    async fn update_item_fields(
        &self,
        board_id: &str,
        item_id: &str,
        values: &ColumnValues,
    ) -> Result<(), BoardError>;

    async fn rename_item(&self, board_id: &str, item_id: &str, name: &str)
        -> Result<(), BoardError>;

    /// Id of an item whose `column_id` equals `value`
    async fn find_item_by_value(
        &self,
        board_id: &str,
        column_id: &str,
        value: &str,
    ) -> Result<Option<String>, BoardError>;

    async fn item_state(&self, board_id: &str, item_id: &str) -> Result<ItemState, BoardError>;

    async fn update_hearing_location(
        &self,
        board_id: &str,
        item_id: &str,
        judge: Option<&str>,
        city: Option<&str>,
    ) -> Result<(), BoardError>;

    async fn update_hearing_date(
        &self,
        board_id: &str,
        item_id: &str,
        starts_at: NaiveDateTime,
    ) -> Result<(), BoardError>;

    async fn set_hearing_status(
        &self,
        board_id: &str,
        item_id: &str,
        label: &str,
    ) -> Result<(), BoardError>;
}

/// One board column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub id: String,
    /// Allowed labels of an enumerated column; empty for free-form columns
    #[serde(default)]
    pub allowed_values: Vec<String>,
}

/// Board columns keyed by label
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardSchema {
    pub columns: HashMap<String, ColumnInfo>,
}

impl BoardSchema {
    pub fn column(&self, label: &str) -> Option<&ColumnInfo> {
        self.columns.get(label)
    }
}

#[async_trait]
pub trait BoardMetadataProvider: Send + Sync {
    async fn fetch_board_schema(&self, board_id: &str) -> Result<BoardSchema, BoardError>;
}
