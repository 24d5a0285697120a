//! File- and memory-backed collaborators
//!
//! [`FixtureSource`] serves cases and hearing events from a JSON document,
//! [`MemoryBoard`] keeps board items in memory and can be told to fail, and
//! [`StaticMetadata`] returns a fixed board schema. The binary uses them for
//! dry runs; the tests use them as fakes.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::Path;
use std::sync::Mutex;

use crate::error::{BoardError, SourceError};
use crate::models::{CaseField, CaseRecord, HearingEvent, SourceCaseRow};
use crate::ports::{
    BoardClient, BoardMetadataProvider, BoardSchema, ColumnInfo, ColumnValues, ItemState,
    SourceReader, SourceWriter,
};
use crate::reconcile::HEARING_STATUS_COLUMN;

/// On-disk fixture layout
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FixtureDocument {
    #[serde(default)]
    pub cases: Vec<SourceCaseRow>,
    #[serde(default)]
    pub hearings: Vec<HearingEvent>,
}

#[derive(Default)]
struct SourceState {
    cases: BTreeMap<i64, CaseRecord>,
    hearings: Vec<HearingEvent>,
    annotations: Vec<(i64, String)>,
    unavailable: bool,
}

/// Source reader over an in-memory copy of a fixture document
#[derive(Default)]
pub struct FixtureSource {
    state: Mutex<SourceState>,
}

impl FixtureSource {
    pub fn new(cases: Vec<CaseRecord>, hearings: Vec<HearingEvent>) -> Self {
        let source = Self::default();
        {
            let mut state = lock(&source.state);
            state.cases = cases.into_iter().map(|c| (c.id, c)).collect();
            state.hearings = hearings;
        }
        source
    }

    pub fn from_document(document: FixtureDocument) -> Self {
        let cases = document
            .cases
            .into_iter()
            .map(SourceCaseRow::into_case)
            .collect();
        Self::new(cases, document.hearings)
    }

    pub fn load(path: &Path) -> docket_common::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let document: FixtureDocument = serde_json::from_str(&content).map_err(|e| {
            docket_common::Error::InvalidFixture(format!(
                "Fixture {} is not valid: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self::from_document(document))
    }

    /// Insert or replace a case
    pub fn upsert_case(&self, record: CaseRecord) {
        lock(&self.state).cases.insert(record.id, record);
    }

    pub fn set_hearings(&self, hearings: Vec<HearingEvent>) {
        lock(&self.state).hearings = hearings;
    }

    /// Make every read fail with [`SourceError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    pub fn annotations(&self) -> Vec<(i64, String)> {
        lock(&self.state).annotations.clone()
    }

    fn read(&self) -> Result<std::sync::MutexGuard<'_, SourceState>, SourceError> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(SourceError::Unavailable("fixture source offline".to_string()));
        }
        Ok(state)
    }
}

fn created_on_or_after(record: &CaseRecord, since: NaiveDate) -> bool {
    record.created_at.is_some_and(|ts| ts.date() >= since)
}

#[async_trait]
impl SourceReader for FixtureSource {
    async fn fetch_created_since(&self, since: NaiveDate) -> Result<Vec<CaseRecord>, SourceError> {
        let state = self.read()?;
        Ok(state
            .cases
            .values()
            .filter(|c| created_on_or_after(c, since))
            .cloned()
            .collect())
    }

    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<CaseRecord>, SourceError> {
        let state = self.read()?;
        Ok(ids.iter().filter_map(|id| state.cases.get(id).cloned()).collect())
    }

    async fn fetch_hearing_events(
        &self,
        case_ids: &[i64],
    ) -> Result<Vec<HearingEvent>, SourceError> {
        let state = self.read()?;
        let wanted: BTreeSet<i64> = case_ids.iter().copied().collect();
        Ok(state
            .hearings
            .iter()
            .filter(|e| e.case_id.is_some_and(|id| wanted.contains(&id)))
            .cloned()
            .collect())
    }

    async fn resolve_case_number(&self, case_number: &str) -> Result<Option<i64>, SourceError> {
        let state = self.read()?;
        Ok(state
            .cases
            .values()
            .find(|c| c.case_number.trim() == case_number.trim())
            .map(|c| c.id))
    }

    async fn list_ids_created_since(&self, since: NaiveDate) -> Result<BTreeSet<i64>, SourceError> {
        let state = self.read()?;
        Ok(state
            .cases
            .values()
            .filter(|c| created_on_or_after(c, since))
            .map(|c| c.id)
            .collect())
    }

    async fn list_ids_modified_since(
        &self,
        since: NaiveDateTime,
    ) -> Result<BTreeSet<i64>, SourceError> {
        let state = self.read()?;
        Ok(state
            .cases
            .values()
            .filter(|c| c.modified_at.is_some_and(|ts| ts >= since))
            .map(|c| c.id)
            .collect())
    }
}

#[async_trait]
impl SourceWriter for FixtureSource {
    async fn append_annotation(&self, case_id: i64, text: &str) -> Result<(), SourceError> {
        let mut state = lock(&self.state);
        if !state.cases.contains_key(&case_id) {
            return Err(SourceError::Query(format!("unknown case {}", case_id)));
        }
        state.annotations.push((case_id, text.to_string()));
        Ok(())
    }
}

/// One board item as held by [`MemoryBoard`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryItem {
    pub id: String,
    pub name: String,
    pub values: ColumnValues,
    pub state: ItemState,
    pub hearing_judge: Option<String>,
    pub hearing_city: Option<String>,
    pub hearing_date: Option<NaiveDateTime>,
    pub hearing_status: Option<String>,
}

#[derive(Default)]
struct BoardState {
    next_id: u64,
    items: BTreeMap<String, MemoryItem>,
    calls: Vec<String>,
    /// Errors returned by the next calls of an operation, in order
    failures: HashMap<String, VecDeque<BoardError>>,
    /// Error returned by every call of an operation
    always_fail: HashMap<String, BoardError>,
}

impl BoardState {
    fn enter(&mut self, operation: &str) -> Result<(), BoardError> {
        self.calls.push(operation.to_string());
        if let Some(error) = self.always_fail.get(operation) {
            return Err(error.clone());
        }
        if let Some(error) = self.failures.get_mut(operation).and_then(VecDeque::pop_front) {
            return Err(error);
        }
        Ok(())
    }

    fn item_mut(&mut self, item_id: &str) -> Result<&mut MemoryItem, BoardError> {
        match self.items.get_mut(item_id) {
            Some(item) if item.state.is_active() => Ok(item),
            Some(_) => Err(BoardError::ItemInactive(item_id.to_string())),
            None => Err(BoardError::Http {
                status: 404,
                message: format!("item {} not found", item_id),
            }),
        }
    }
}

/// In-memory task board with a call log and failure injection
#[derive(Default)]
pub struct MemoryBoard {
    state: Mutex<BoardState>,
}

impl MemoryBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error for the next call of `operation`
    pub fn fail_next(&self, operation: &str, error: BoardError) {
        lock(&self.state)
            .failures
            .entry(operation.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fail every call of `operation` until [`MemoryBoard::clear_failures`]
    pub fn fail_always(&self, operation: &str, error: BoardError) {
        lock(&self.state)
            .always_fail
            .insert(operation.to_string(), error);
    }

    pub fn clear_failures(&self) {
        let mut state = lock(&self.state);
        state.failures.clear();
        state.always_fail.clear();
    }

    /// Place an item on the board directly, bypassing the call log
    pub fn seed_item(&self, name: &str, values: ColumnValues, item_state: ItemState) -> String {
        let mut state = lock(&self.state);
        let id = next_item_id(&mut state);
        state.items.insert(
            id.clone(),
            MemoryItem {
                id: id.clone(),
                name: name.to_string(),
                values,
                state: item_state,
                hearing_judge: None,
                hearing_city: None,
                hearing_date: None,
                hearing_status: None,
            },
        );
        id
    }

    pub fn item(&self, item_id: &str) -> Option<MemoryItem> {
        lock(&self.state).items.get(item_id).cloned()
    }

    pub fn items(&self) -> Vec<MemoryItem> {
        lock(&self.state).items.values().cloned().collect()
    }

    /// Operation names in call order
    pub fn calls(&self) -> Vec<String> {
        lock(&self.state).calls.clone()
    }

    pub fn count_calls(&self, operation: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|c| c.as_str() == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        lock(&self.state).calls.clear();
    }
}

fn next_item_id(state: &mut BoardState) -> String {
    state.next_id += 1;
    format!("item-{}", state.next_id)
}

#[async_trait]
impl BoardClient for MemoryBoard {
    async fn create_item(
        &self,
        _board_id: &str,
        name: &str,
        values: &ColumnValues,
    ) -> Result<String, BoardError> {
        let mut state = lock(&self.state);
        state.enter("create_item")?;
        let id = next_item_id(&mut state);
        state.items.insert(
            id.clone(),
            MemoryItem {
                id: id.clone(),
                name: name.to_string(),
                values: values.clone(),
                state: ItemState::Active,
                hearing_judge: None,
                hearing_city: None,
                hearing_date: None,
                hearing_status: None,
            },
        );
        Ok(id)
    }

    async fn update_item_fields(
        &self,
        _board_id: &str,
        item_id: &str,
        values: &ColumnValues,
    ) -> Result<(), BoardError> {
        let mut state = lock(&self.state);
        state.enter("update_item_fields")?;
        let item = state.item_mut(item_id)?;
        item.values.extend(values.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn rename_item(
        &self,
        _board_id: &str,
        item_id: &str,
        name: &str,
    ) -> Result<(), BoardError> {
        let mut state = lock(&self.state);
        state.enter("rename_item")?;
        state.item_mut(item_id)?.name = name.to_string();
        Ok(())
    }

    async fn find_item_by_value(
        &self,
        _board_id: &str,
        column_id: &str,
        value: &str,
    ) -> Result<Option<String>, BoardError> {
        let mut state = lock(&self.state);
        state.enter("find_item_by_value")?;
        // Active items first, like a board search ordered by recency of use
        let mut matches: Vec<&MemoryItem> = state
            .items
            .values()
            .filter(|item| item.values.get(column_id).map(String::as_str) == Some(value))
            .collect();
        matches.sort_by_key(|item| !item.state.is_active());
        Ok(matches.first().map(|item| item.id.clone()))
    }

    async fn item_state(&self, _board_id: &str, item_id: &str) -> Result<ItemState, BoardError> {
        let mut state = lock(&self.state);
        state.enter("item_state")?;
        Ok(state
            .items
            .get(item_id)
            .map(|item| item.state)
            .unwrap_or(ItemState::Deleted))
    }

    async fn update_hearing_location(
        &self,
        _board_id: &str,
        item_id: &str,
        judge: Option<&str>,
        city: Option<&str>,
    ) -> Result<(), BoardError> {
        let mut state = lock(&self.state);
        state.enter("update_hearing_location")?;
        let item = state.item_mut(item_id)?;
        item.hearing_judge = judge.map(str::to_string);
        item.hearing_city = city.map(str::to_string);
        Ok(())
    }

    async fn update_hearing_date(
        &self,
        _board_id: &str,
        item_id: &str,
        starts_at: NaiveDateTime,
    ) -> Result<(), BoardError> {
        let mut state = lock(&self.state);
        state.enter("update_hearing_date")?;
        state.item_mut(item_id)?.hearing_date = Some(starts_at);
        Ok(())
    }

    async fn set_hearing_status(
        &self,
        _board_id: &str,
        item_id: &str,
        label: &str,
    ) -> Result<(), BoardError> {
        let mut state = lock(&self.state);
        state.enter("set_hearing_status")?;
        state.item_mut(item_id)?.hearing_status = Some(label.to_string());
        Ok(())
    }
}

/// Board metadata provider returning one fixed schema for every board
pub struct StaticMetadata {
    schema: BoardSchema,
}

impl StaticMetadata {
    pub fn new(schema: BoardSchema) -> Self {
        Self { schema }
    }

    /// Schema with a column for every case field plus the hearing status column
    pub fn standard() -> Self {
        let mut columns: HashMap<String, ColumnInfo> = CaseField::ALL
            .iter()
            .map(|field| {
                (
                    field.column_label().to_string(),
                    ColumnInfo {
                        id: field.name().to_string(),
                        allowed_values: Vec::new(),
                    },
                )
            })
            .collect();
        columns.insert(
            HEARING_STATUS_COLUMN.to_string(),
            ColumnInfo {
                id: "hearing_status".to_string(),
                allowed_values: vec![
                    "active".to_string(),
                    "cancelled".to_string(),
                    "rescheduled".to_string(),
                ],
            },
        );
        Self::new(BoardSchema { columns })
    }
}

#[async_trait]
impl BoardMetadataProvider for StaticMetadata {
    async fn fetch_board_schema(&self, _board_id: &str) -> Result<BoardSchema, BoardError> {
        Ok(self.schema.clone())
    }
}

/// Poison-tolerant lock; fixture state stays usable after a panicking test thread
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
