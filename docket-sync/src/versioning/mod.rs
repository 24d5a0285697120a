//! Content versioning
//!
//! A content version is the SHA-256 (64 lowercase hex chars) of a case's
//! tracked business fields, normalized and concatenated in a fixed order.
//! It is a pure function of the record: no clock, no hidden state.
//! `modified_at` and the hearing sub-record are never tracked here.

pub mod normalize;

use sha2::{Digest, Sha256};

use crate::models::{CaseField, CaseRecord, FieldValue, NearestHearing};

/// Computes content versions over an ordered field list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentVersioner {
    fields: Vec<CaseField>,
}

impl Default for ContentVersioner {
    fn default() -> Self {
        Self {
            fields: CaseField::ALL.to_vec(),
        }
    }
}

impl ContentVersioner {
    pub fn new(fields: Vec<CaseField>) -> Self {
        Self { fields }
    }

    /// Build from configured field names, rejecting unknown or repeated names
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut fields = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            let field = CaseField::from_name(name)
                .ok_or_else(|| format!("unknown tracked field '{}'", name))?;
            if fields.contains(&field) {
                return Err(format!("tracked field '{}' listed twice", name));
            }
            fields.push(field);
        }
        if fields.is_empty() {
            return Err("tracked field list is empty".to_string());
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[CaseField] {
        &self.fields
    }

    /// Content version of a record
    pub fn version(&self, record: &CaseRecord) -> String {
        let mut hasher = Sha256::new();
        for field in &self.fields {
            let value = normalized_value(record.field(*field));
            // Length-prefixed so adjacent values cannot bleed into each other
            hasher.update(field.name().as_bytes());
            hasher.update(format!(":{}:", value.len()).as_bytes());
            hasher.update(value.as_bytes());
            hasher.update(b"\n");
        }
        format!("{:x}", hasher.finalize())
    }
}

/// Normalized string form of one field value
pub fn normalized_value(value: FieldValue<'_>) -> String {
    match value {
        FieldValue::Text(v) => normalize::text(v),
        FieldValue::Phone(v) => normalize::phone(v),
        FieldValue::Decimal(v) => normalize::decimal(v),
        FieldValue::DateTime(v) => normalize::date_time(v),
    }
}

/// Checksum of the hearing sub-record as last written to the board
pub fn hearing_checksum(hearing: &NearestHearing) -> String {
    let payload = format!(
        "{}|{}|{}|{}",
        normalize::date_time(Some(hearing.starts_at)),
        hearing.status.code(),
        normalize::text(hearing.judge.as_deref()),
        normalize::text(hearing.city.as_deref()),
    );
    format!("{:x}", Sha256::digest(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HearingStatus;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    fn record() -> CaseRecord {
        CaseRecord {
            id: 1,
            case_number: "2024-0001".to_string(),
            created_at: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, 0, 0),
            title: Some("Levi v. Cohen".to_string()),
            client_phone: Some("050-1234567".to_string()),
            claim_amount: Some(Decimal::new(10_000, 2)),
            ..Default::default()
        }
    }

    fn is_lower_hex_64(s: &str) -> bool {
        s.len() == 64 && s.chars().all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
    }

    #[test]
    fn test_identical_records_hash_identically() {
        let versioner = ContentVersioner::default();
        let a = versioner.version(&record());
        let b = versioner.version(&record());
        assert_eq!(a, b);
        assert!(is_lower_hex_64(&a));
    }

    #[test]
    fn test_every_tracked_field_changes_hash() {
        let versioner = ContentVersioner::default();
        let base = record();
        let base_hash = versioner.version(&base);

        let closed = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap().and_hms_opt(0, 0, 0);
        let variants: Vec<CaseRecord> = vec![
            CaseRecord { case_number: "2024-0002".into(), ..base.clone() },
            CaseRecord { title: Some("Other".into()), ..base.clone() },
            CaseRecord { plaintiff_name: Some("Levi".into()), ..base.clone() },
            CaseRecord { defendant_name: Some("Cohen".into()), ..base.clone() },
            CaseRecord { client_phone: Some("050-7654321".into()), ..base.clone() },
            CaseRecord { opposing_phone: Some("03-5555555".into()), ..base.clone() },
            CaseRecord { claim_amount: Some(Decimal::new(10_001, 2)), ..base.clone() },
            CaseRecord { paid_amount: Some(Decimal::ONE), ..base.clone() },
            CaseRecord { court_name: Some("District".into()), ..base.clone() },
            CaseRecord { court_case_number: Some("123-45".into()), ..base.clone() },
            CaseRecord { judge_name: Some("Dayan".into()), ..base.clone() },
            CaseRecord { case_status: Some("closed".into()), ..base.clone() },
            CaseRecord { responsible_lawyer: Some("Adv. Mizrahi".into()), ..base.clone() },
            CaseRecord { notes: Some("called".into()), ..base.clone() },
            CaseRecord { closed_at: closed, ..base.clone() },
        ];
        assert_eq!(variants.len(), CaseField::ALL.len());

        for variant in variants {
            assert!(variant.modified_at.is_none());
            assert_ne!(versioner.version(&variant), base_hash, "{:?}", variant);
        }
    }

    #[test]
    fn test_untracked_fields_do_not_change_hash() {
        let versioner = ContentVersioner::default();
        let base = record();
        let touched = CaseRecord {
            modified_at: NaiveDate::from_ymd_opt(2024, 4, 1).unwrap().and_hms_opt(0, 0, 0),
            nearest_hearing: Some(NearestHearing {
                case_id: 1,
                starts_at: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(9, 0, 0).unwrap(),
                status: HearingStatus::Active,
                judge: None,
                city: None,
            }),
            ..base.clone()
        };
        assert_eq!(versioner.version(&base), versioner.version(&touched));
    }

    #[test]
    fn test_null_empty_and_blank_strings_agree() {
        let versioner = ContentVersioner::default();
        let hashes: Vec<String> = [None, Some(""), Some("   ")]
            .into_iter()
            .map(|notes| {
                versioner.version(&CaseRecord {
                    notes: notes.map(str::to_string),
                    ..record()
                })
            })
            .collect();
        assert_eq!(hashes[0], hashes[1]);
        assert_eq!(hashes[1], hashes[2]);
    }

    #[test]
    fn test_null_decimal_differs_from_zero() {
        let versioner = ContentVersioner::default();
        let none = versioner.version(&CaseRecord { paid_amount: None, ..record() });
        let zero = versioner.version(&CaseRecord { paid_amount: Some(Decimal::ZERO), ..record() });
        assert_ne!(none, zero);
    }

    #[test]
    fn test_phone_formats_agree() {
        let versioner = ContentVersioner::default();
        let local = versioner.version(&CaseRecord {
            client_phone: Some("050-1234567".into()),
            ..record()
        });
        let intl = versioner.version(&CaseRecord {
            client_phone: Some("+972 50 123 4567".into()),
            ..record()
        });
        let other = versioner.version(&CaseRecord {
            client_phone: Some("+972 50 123 4568".into()),
            ..record()
        });
        assert_eq!(local, intl);
        assert_ne!(local, other);
    }

    #[test]
    fn test_field_subset_ignores_other_fields() {
        let versioner = ContentVersioner::from_names(&["title", "claim_amount"]).unwrap();
        let base = versioner.version(&record());
        let changed_notes = versioner.version(&CaseRecord {
            notes: Some("ignored".into()),
            ..record()
        });
        assert_eq!(base, changed_notes);
    }

    #[test]
    fn test_from_names_rejects_bad_lists() {
        assert!(ContentVersioner::from_names(&["title", "nope"]).is_err());
        assert!(ContentVersioner::from_names(&["title", "title"]).is_err());
        assert!(ContentVersioner::from_names::<&str>(&[]).is_err());
    }

    #[test]
    fn test_hearing_checksum_tracks_every_field() {
        let hearing = NearestHearing {
            case_id: 1,
            starts_at: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(9, 0, 0).unwrap(),
            status: HearingStatus::Active,
            judge: Some("Dayan".into()),
            city: Some("Haifa".into()),
        };
        let base = hearing_checksum(&hearing);
        assert_eq!(base, hearing_checksum(&hearing.clone()));
        assert_ne!(
            base,
            hearing_checksum(&NearestHearing { status: HearingStatus::Cancelled, ..hearing.clone() })
        );
        assert_ne!(
            base,
            hearing_checksum(&NearestHearing { city: Some("Tel Aviv".into()), ..hearing })
        );
    }
}
