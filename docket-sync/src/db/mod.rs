//! State store repositories
//!
//! Free functions over a `SqlitePool`, one module per table. Schema creation
//! lives in `docket_common::db`.

pub mod alert_dedup;
pub mod failures;
pub mod hearings;
pub mod mappings;
pub mod metrics;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use docket_common::time::from_db_timestamp;
use docket_common::{Error, Result};

pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";
pub(crate) const LOCAL_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub(crate) fn parse_optional_timestamp(value: Option<String>) -> Result<Option<DateTime<Utc>>> {
    value.as_deref().map(from_db_timestamp).transpose()
}

pub(crate) fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| Error::CorruptValue {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

pub(crate) fn parse_local_timestamp(value: &str) -> Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, LOCAL_TIMESTAMP_FORMAT)
        .map_err(|e| Error::CorruptValue {
            value: value.to_string(),
            reason: e.to_string(),
        })
}
