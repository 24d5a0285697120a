//! Historical source schemas and their adapters to [`CaseRecord`]
//!
//! Each variant has exactly one adapter. Normalization (null vs. empty, phone
//! formats) is left to the versioning functions, not done here.

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::case::CaseRecord;
use super::hearing::{HearingStatus, NearestHearing};

/// Original schema: parties in one column, claim in minor currency units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyCaseRow {
    pub case_id: i64,
    pub file_no: String,
    pub opened: Option<NaiveDateTime>,
    pub updated: Option<NaiveDateTime>,
    pub closed: Option<NaiveDateTime>,
    pub subject: Option<String>,
    /// "Plaintiff v. Defendant"
    pub parties: Option<String>,
    pub phone: Option<String>,
    pub claim_agorot: Option<i64>,
    pub court: Option<String>,
    pub judge: Option<String>,
    pub status: Option<String>,
}

/// Current schema, with the nearest hearing flattened into the row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseRowV2 {
    pub id: i64,
    pub case_number: String,
    pub created_at: Option<NaiveDateTime>,
    pub modified_at: Option<NaiveDateTime>,
    pub closed_at: Option<NaiveDateTime>,
    pub title: Option<String>,
    pub plaintiff_name: Option<String>,
    pub defendant_name: Option<String>,
    pub client_phone: Option<String>,
    pub opposing_phone: Option<String>,
    pub claim_amount: Option<Decimal>,
    pub paid_amount: Option<Decimal>,
    pub court_name: Option<String>,
    pub court_case_number: Option<String>,
    pub judge_name: Option<String>,
    pub case_status: Option<String>,
    pub responsible_lawyer: Option<String>,
    pub notes: Option<String>,
    pub hearing_starts_at: Option<NaiveDateTime>,
    pub hearing_status: Option<i32>,
    pub hearing_judge: Option<String>,
    pub hearing_city: Option<String>,
}

/// A row in any supported source schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "schema", rename_all = "snake_case")]
pub enum SourceCaseRow {
    Legacy(LegacyCaseRow),
    V2(CaseRowV2),
}

impl SourceCaseRow {
    pub fn into_case(self) -> CaseRecord {
        match self {
            SourceCaseRow::Legacy(row) => row.into(),
            SourceCaseRow::V2(row) => row.into(),
        }
    }
}

fn split_parties(parties: Option<&str>) -> (Option<String>, Option<String>) {
    let Some(parties) = parties else {
        return (None, None);
    };
    match parties.split_once(" v. ") {
        Some((plaintiff, defendant)) => (
            Some(plaintiff.trim().to_string()),
            Some(defendant.trim().to_string()),
        ),
        None => (Some(parties.trim().to_string()), None),
    }
}

impl From<LegacyCaseRow> for CaseRecord {
    fn from(row: LegacyCaseRow) -> Self {
        let (plaintiff_name, defendant_name) = split_parties(row.parties.as_deref());
        CaseRecord {
            id: row.case_id,
            case_number: row.file_no,
            created_at: row.opened,
            modified_at: row.updated,
            closed_at: row.closed,
            title: row.subject,
            plaintiff_name,
            defendant_name,
            client_phone: row.phone,
            opposing_phone: None,
            claim_amount: row.claim_agorot.map(|minor| Decimal::new(minor, 2)),
            paid_amount: None,
            court_name: row.court,
            court_case_number: None,
            judge_name: row.judge,
            case_status: row.status,
            responsible_lawyer: None,
            notes: None,
            nearest_hearing: None,
        }
    }
}

impl From<CaseRowV2> for CaseRecord {
    fn from(row: CaseRowV2) -> Self {
        let nearest_hearing = match (row.hearing_starts_at, row.hearing_status) {
            (Some(starts_at), Some(code)) => {
                HearingStatus::try_from(code)
                    .ok()
                    .map(|status| NearestHearing {
                        case_id: row.id,
                        starts_at,
                        status,
                        judge: row.hearing_judge.clone(),
                        city: row.hearing_city.clone(),
                    })
            }
            _ => None,
        };

        CaseRecord {
            id: row.id,
            case_number: row.case_number,
            created_at: row.created_at,
            modified_at: row.modified_at,
            closed_at: row.closed_at,
            title: row.title,
            plaintiff_name: row.plaintiff_name,
            defendant_name: row.defendant_name,
            client_phone: row.client_phone,
            opposing_phone: row.opposing_phone,
            claim_amount: row.claim_amount,
            paid_amount: row.paid_amount,
            court_name: row.court_name,
            court_case_number: row.court_case_number,
            judge_name: row.judge_name,
            case_status: row.case_status,
            responsible_lawyer: row.responsible_lawyer,
            notes: row.notes,
            nearest_hearing,
        }
    }
}
