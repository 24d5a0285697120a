//! Hearing events and the nearest-hearing sub-record

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hearing status as coded by the source system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HearingStatus {
    Active,
    Cancelled,
    Transferred,
}

impl HearingStatus {
    pub fn code(&self) -> i32 {
        match self {
            HearingStatus::Active => 0,
            HearingStatus::Cancelled => 1,
            HearingStatus::Transferred => 2,
        }
    }

    /// Label shown in the board's hearing status column
    pub fn board_label(&self) -> &'static str {
        match self {
            HearingStatus::Active => "active",
            HearingStatus::Cancelled => "cancelled",
            HearingStatus::Transferred => "rescheduled",
        }
    }
}

impl TryFrom<i32> for HearingStatus {
    type Error = String;

    fn try_from(code: i32) -> Result<Self, Self::Error> {
        match code {
            0 => Ok(HearingStatus::Active),
            1 => Ok(HearingStatus::Cancelled),
            2 => Ok(HearingStatus::Transferred),
            other => Err(format!("unknown hearing status code {}", other)),
        }
    }
}

impl fmt::Display for HearingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.board_label())
    }
}

/// Candidate hearing row from the source system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HearingEvent {
    pub event_id: i64,
    pub case_id: Option<i64>,
    pub starts_at: Option<NaiveDateTime>,
    pub status_code: i32,
    pub judge: Option<String>,
    pub city: Option<String>,
}

/// The single nearest upcoming hearing of a case
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearestHearing {
    pub case_id: i64,
    pub starts_at: NaiveDateTime,
    pub status: HearingStatus,
    pub judge: Option<String>,
    pub city: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_round_trip() {
        for status in [
            HearingStatus::Active,
            HearingStatus::Cancelled,
            HearingStatus::Transferred,
        ] {
            assert_eq!(HearingStatus::try_from(status.code()), Ok(status));
        }
        assert!(HearingStatus::try_from(7).is_err());
    }

    #[test]
    fn test_transferred_shows_as_rescheduled() {
        assert_eq!(HearingStatus::Transferred.board_label(), "rescheduled");
    }
}
