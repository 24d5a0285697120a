//! Canonical source records and their adapters

pub mod case;
pub mod hearing;
pub mod source_variants;

pub use case::{CaseField, CaseRecord, FieldValue};
pub use hearing::{HearingEvent, HearingStatus, NearestHearing};
pub use source_variants::{CaseRowV2, LegacyCaseRow, SourceCaseRow};
