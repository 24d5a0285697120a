//! Canonical case record

use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::hearing::NearestHearing;

/// Source-of-record case snapshot. Read-only to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaseRecord {
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
    pub nearest_hearing: Option<NearestHearing>,
}

/// Typed view of one business field, before normalization
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Text(Option<&'a str>),
    Phone(Option<&'a str>),
    Decimal(Option<Decimal>),
    DateTime(Option<NaiveDateTime>),
}

/// Business fields that can take part in the content version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseField {
    CaseNumber,
    Title,
    PlaintiffName,
    DefendantName,
    ClientPhone,
    OpposingPhone,
    ClaimAmount,
    PaidAmount,
    CourtName,
    CourtCaseNumber,
    JudgeName,
    CaseStatus,
    ResponsibleLawyer,
    Notes,
    ClosedAt,
}

impl CaseField {
    /// Default hashing order
    pub const ALL: [CaseField; 15] = [
        CaseField::CaseNumber,
        CaseField::Title,
        CaseField::PlaintiffName,
        CaseField::DefendantName,
        CaseField::ClientPhone,
        CaseField::OpposingPhone,
        CaseField::ClaimAmount,
        CaseField::PaidAmount,
        CaseField::CourtName,
        CaseField::CourtCaseNumber,
        CaseField::JudgeName,
        CaseField::CaseStatus,
        CaseField::ResponsibleLawyer,
        CaseField::Notes,
        CaseField::ClosedAt,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CaseField::CaseNumber => "case_number",
            CaseField::Title => "title",
            CaseField::PlaintiffName => "plaintiff_name",
            CaseField::DefendantName => "defendant_name",
            CaseField::ClientPhone => "client_phone",
            CaseField::OpposingPhone => "opposing_phone",
            CaseField::ClaimAmount => "claim_amount",
            CaseField::PaidAmount => "paid_amount",
            CaseField::CourtName => "court_name",
            CaseField::CourtCaseNumber => "court_case_number",
            CaseField::JudgeName => "judge_name",
            CaseField::CaseStatus => "case_status",
            CaseField::ResponsibleLawyer => "responsible_lawyer",
            CaseField::Notes => "notes",
            CaseField::ClosedAt => "closed_at",
        }
    }

    pub fn from_name(name: &str) -> Option<CaseField> {
        CaseField::ALL.iter().copied().find(|f| f.name() == name)
    }

    /// Board column label written for this field
    pub fn column_label(&self) -> &'static str {
        match self {
            CaseField::CaseNumber => "Case Number",
            CaseField::Title => "Title",
            CaseField::PlaintiffName => "Plaintiff",
            CaseField::DefendantName => "Defendant",
            CaseField::ClientPhone => "Client Phone",
            CaseField::OpposingPhone => "Opposing Phone",
            CaseField::ClaimAmount => "Claim Amount",
            CaseField::PaidAmount => "Paid Amount",
            CaseField::CourtName => "Court",
            CaseField::CourtCaseNumber => "Court Case Number",
            CaseField::JudgeName => "Judge",
            CaseField::CaseStatus => "Status",
            CaseField::ResponsibleLawyer => "Lawyer",
            CaseField::Notes => "Notes",
            CaseField::ClosedAt => "Closed",
        }
    }
}

impl CaseRecord {
    pub fn field(&self, field: CaseField) -> FieldValue<'_> {
        match field {
            CaseField::CaseNumber => FieldValue::Text(Some(self.case_number.as_str())),
            CaseField::Title => FieldValue::Text(self.title.as_deref()),
            CaseField::PlaintiffName => FieldValue::Text(self.plaintiff_name.as_deref()),
            CaseField::DefendantName => FieldValue::Text(self.defendant_name.as_deref()),
            CaseField::ClientPhone => FieldValue::Phone(self.client_phone.as_deref()),
            CaseField::OpposingPhone => FieldValue::Phone(self.opposing_phone.as_deref()),
            CaseField::ClaimAmount => FieldValue::Decimal(self.claim_amount),
            CaseField::PaidAmount => FieldValue::Decimal(self.paid_amount),
            CaseField::CourtName => FieldValue::Text(self.court_name.as_deref()),
            CaseField::CourtCaseNumber => FieldValue::Text(self.court_case_number.as_deref()),
            CaseField::JudgeName => FieldValue::Text(self.judge_name.as_deref()),
            CaseField::CaseStatus => FieldValue::Text(self.case_status.as_deref()),
            CaseField::ResponsibleLawyer => FieldValue::Text(self.responsible_lawyer.as_deref()),
            CaseField::Notes => FieldValue::Text(self.notes.as_deref()),
            CaseField::ClosedAt => FieldValue::DateTime(self.closed_at),
        }
    }

    /// Name of the board item representing this case
    pub fn item_name(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(title) if !title.is_empty() => format!("{} - {}", self.case_number.trim(), title),
            _ => self.case_number.trim().to_string(),
        }
    }

    /// Sanity checks on business-critical fields before any external write
    pub fn validate(&self) -> Result<(), String> {
        if self.case_number.trim().is_empty() {
            return Err(format!("case {} has an empty case number", self.id));
        }
        for (label, amount) in [("claim", self.claim_amount), ("paid", self.paid_amount)] {
            if let Some(value) = amount {
                if value.is_sign_negative() && !value.is_zero() {
                    return Err(format!("case {} has a negative {} amount", self.id, label));
                }
            }
        }
        if let (Some(created), Some(closed)) = (self.created_at, self.closed_at) {
            if closed < created {
                return Err(format!("case {} was closed before it was created", self.id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
    }

    fn sample() -> CaseRecord {
        CaseRecord {
            id: 7,
            case_number: "2024-0007".to_string(),
            created_at: Some(at(2024, 3, 1)),
            title: Some("Levi v. Cohen".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_field_names_round_trip() {
        for field in CaseField::ALL {
            assert_eq!(CaseField::from_name(field.name()), Some(field));
        }
        assert_eq!(CaseField::from_name("modified_at"), None);
    }

    #[test]
    fn test_item_name() {
        assert_eq!(sample().item_name(), "2024-0007 - Levi v. Cohen");

        let untitled = CaseRecord {
            title: Some("  ".to_string()),
            ..sample()
        };
        assert_eq!(untitled.item_name(), "2024-0007");
    }

    #[test]
    fn test_validate_accepts_sane_record() {
        assert!(sample().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_case_number() {
        let record = CaseRecord {
            case_number: " ".to_string(),
            ..sample()
        };
        assert!(record.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_negative_amount() {
        let record = CaseRecord {
            claim_amount: Some(Decimal::new(-100, 2)),
            ..sample()
        };
        assert!(record.validate().unwrap_err().contains("claim"));
    }

    #[test]
    fn test_validate_rejects_close_before_create() {
        let record = CaseRecord {
            closed_at: Some(at(2024, 2, 1)),
            ..sample()
        };
        assert!(record.validate().is_err());
    }
}
