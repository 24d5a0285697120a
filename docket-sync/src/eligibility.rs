//! Eligibility and bootstrap discovery
//!
//! Decides which source cases may be onboarded. Discovery is a direct scan of
//! creation dates, so a backlog built up while the service was down is found
//! on the next run.

use chrono::{NaiveDate, NaiveDateTime};
use docket_common::time::{add_business_days, cooling_complete};
use std::collections::{BTreeSet, HashSet};

use crate::models::CaseRecord;

/// Outcome of evaluating one case for onboarding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    AlreadyMapped,
    NoCreationDate,
    BeforeCutoff,
    /// Still being edited upstream; first eligible on `eligible_on`
    Cooling { eligible_on: NaiveDate },
}

/// Date-only cutoff comparison. No creation date fails closed.
pub fn is_after_cutoff(created: Option<NaiveDateTime>, cutoff: NaiveDate) -> bool {
    created.is_some_and(|ts| ts.date() >= cutoff)
}

/// Bootstrap rules for one deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapPolicy {
    pub cutoff: NaiveDate,
    pub cooling_business_days: u32,
}

/// Cases partitioned by onboarding outcome
#[derive(Debug, Default)]
pub struct BootstrapSelection {
    pub eligible: Vec<CaseRecord>,
    pub cooling: Vec<(i64, NaiveDate)>,
    /// Everything else that was not already mapped
    pub ineligible: Vec<(i64, Eligibility)>,
    pub already_mapped: usize,
}

impl BootstrapPolicy {
    pub fn new(cutoff: NaiveDate, cooling_business_days: u32) -> Self {
        Self {
            cutoff,
            cooling_business_days,
        }
    }

    pub fn evaluate(
        &self,
        record: &CaseRecord,
        mapped: &HashSet<i64>,
        today: NaiveDate,
    ) -> Eligibility {
        if mapped.contains(&record.id) {
            return Eligibility::AlreadyMapped;
        }
        let Some(created) = record.created_at else {
            return Eligibility::NoCreationDate;
        };
        if !is_after_cutoff(Some(created), self.cutoff) {
            return Eligibility::BeforeCutoff;
        }
        let created_on = created.date();
        if !cooling_complete(created_on, today, self.cooling_business_days) {
            let last_cooling_day = add_business_days(created_on, self.cooling_business_days);
            return Eligibility::Cooling {
                eligible_on: last_cooling_day.succ_opt().unwrap_or(last_cooling_day),
            };
        }
        Eligibility::Eligible
    }

    /// Partition `records` into what should be onboarded now and what should not
    pub fn select_candidates(
        &self,
        records: Vec<CaseRecord>,
        mapped: &HashSet<i64>,
        today: NaiveDate,
    ) -> BootstrapSelection {
        let mut selection = BootstrapSelection::default();
        for record in records {
            match self.evaluate(&record, mapped, today) {
                Eligibility::Eligible => selection.eligible.push(record),
                Eligibility::AlreadyMapped => selection.already_mapped += 1,
                Eligibility::Cooling { eligible_on } => {
                    selection.cooling.push((record.id, eligible_on))
                }
                other => selection.ineligible.push((record.id, other)),
            }
        }
        selection.eligible.sort_by_key(|r| r.id);
        selection
    }
}

/// Mapped cases that are still inside the eligible universe, in processing order
pub fn eligible_mapped(
    eligible_ids: impl IntoIterator<Item = i64>,
    mapped_ids: &HashSet<i64>,
) -> BTreeSet<i64> {
    eligible_ids
        .into_iter()
        .filter(|id| mapped_ids.contains(id))
        .collect()
}
