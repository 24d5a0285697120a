//! Timestamp and business-day utilities
//!
//! The business week runs Sunday through Thursday. Friday and Saturday are
//! never counted.

use chrono::{DateTime, Datelike, Duration, NaiveDate, SecondsFormat, Utc, Weekday};

use crate::{Error, Result};

/// Get current UTC timestamp
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// True for Sunday through Thursday
pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Fri | Weekday::Sat)
}

fn next_business_day(date: NaiveDate) -> NaiveDate {
    let mut next = date + Duration::days(1);
    while !is_business_day(next) {
        next += Duration::days(1);
    }
    next
}

/// Date of the `days`-th business day counting `start` as day #1.
///
/// A start on Friday or Saturday makes the following Sunday day #1.
/// `days == 0` returns `start` unchanged.
pub fn add_business_days(start: NaiveDate, days: u32) -> NaiveDate {
    if days == 0 {
        return start;
    }

    let mut current = if is_business_day(start) {
        start
    } else {
        next_business_day(start)
    };

    for _ in 1..days {
        current = next_business_day(current);
    }
    current
}

/// Whether a record created on `created` has finished a cooling period of
/// `days` business days by `today`.
pub fn cooling_complete(created: NaiveDate, today: NaiveDate, days: u32) -> bool {
    if days == 0 {
        return true;
    }
    today > add_business_days(created, days)
}

/// Format a timestamp for storage. Fixed width, so lexical order matches time order.
pub fn to_db_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a timestamp written by [`to_db_timestamp`]
pub fn from_db_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::CorruptValue {
            value: value.to_string(),
            reason: e.to_string(),
        })
}
