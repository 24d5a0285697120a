//! Hearing sub-state-machine: selection and update planning
//!
//! Both functions here are pure. Execution of the planned steps lives in
//! `reconcile::hearings`.
//!
//! Planned steps are always applied one at a time, in order:
//!
//! | Prior state           | New status  | Steps                                   |
//! |-----------------------|-------------|-----------------------------------------|
//! | none                  | active      | judge/city, date/time, status "active"  |
//! | active                | transferred | status "rescheduled", judge/city, date  |
//! | any                   | cancelled   | status "cancelled" only                 |
//! | identical to snapshot | -           | nothing                                 |
//!
//! A status transition writes every step for the new status. Without a
//! transition only the changed details are written, judge/city before date.

use chrono::{DateTime, NaiveDateTime, Utc};
use docket_common::db::HearingSnapshot;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

use crate::models::{HearingEvent, HearingStatus, NearestHearing};
use crate::versioning::normalize;

/// One external write of the hearing sub-record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HearingStep {
    SetStatus(HearingStatus),
    UpdateJudgeCity {
        judge: Option<String>,
        city: Option<String>,
    },
    UpdateDateTime(NaiveDateTime),
}

impl HearingStep {
    /// Operation name for logs and the dead-letter log
    pub fn operation(&self) -> &'static str {
        match self {
            HearingStep::SetStatus(_) => "set_hearing_status",
            HearingStep::UpdateJudgeCity { .. } => "update_hearing_location",
            HearingStep::UpdateDateTime(_) => "update_hearing_date",
        }
    }
}

/// Nearest future hearing per case.
///
/// Events without a case, without a start, starting at or before `now`, or
/// with an unknown status code are discarded. Ties on start time go to the
/// lowest event id so re-evaluation is stable.
pub fn select_nearest_hearings(
    events: &[HearingEvent],
    now: NaiveDateTime,
) -> BTreeMap<i64, NearestHearing> {
    let mut best: BTreeMap<i64, (i64, NearestHearing)> = BTreeMap::new();

    for event in events {
        let (Some(case_id), Some(starts_at)) = (event.case_id, event.starts_at) else {
            continue;
        };
        if starts_at <= now {
            continue;
        }
        let Ok(status) = HearingStatus::try_from(event.status_code) else {
            continue;
        };

        let candidate = NearestHearing {
            case_id,
            starts_at,
            status,
            judge: event.judge.clone(),
            city: event.city.clone(),
        };

        match best.entry(case_id) {
            Entry::Vacant(slot) => {
                slot.insert((event.event_id, candidate));
            }
            Entry::Occupied(mut slot) => {
                let (best_id, best_hearing) = slot.get();
                if (starts_at, event.event_id) < (best_hearing.starts_at, *best_id) {
                    slot.insert((event.event_id, candidate));
                }
            }
        }
    }

    best.into_iter()
        .map(|(case_id, (_, hearing))| (case_id, hearing))
        .collect()
}

fn same_location(hearing: &NearestHearing, snapshot: &HearingSnapshot) -> bool {
    normalize::text(hearing.judge.as_deref()) == normalize::text(snapshot.judge.as_deref())
        && normalize::text(hearing.city.as_deref()) == normalize::text(snapshot.city.as_deref())
}

/// Ordered steps that bring the board from `prior` to `new`
pub fn plan_hearing_update(
    new: &NearestHearing,
    prior: Option<&HearingSnapshot>,
) -> Vec<HearingStep> {
    let prior_status = prior.and_then(|p| HearingStatus::try_from(p.status).ok());
    let transition = prior_status != Some(new.status);
    let location_changed = prior.map_or(true, |p| !same_location(new, p));
    let date_changed = prior.map_or(true, |p| p.starts_at != new.starts_at);

    if !transition && !location_changed && !date_changed {
        return Vec::new();
    }

    let location_step = || HearingStep::UpdateJudgeCity {
        judge: new.judge.clone(),
        city: new.city.clone(),
    };

    let mut steps = Vec::new();
    match new.status {
        HearingStatus::Cancelled => {
            if transition {
                steps.push(HearingStep::SetStatus(HearingStatus::Cancelled));
            }
        }
        HearingStatus::Transferred => {
            if transition {
                steps.push(HearingStep::SetStatus(HearingStatus::Transferred));
            }
            if transition || location_changed {
                steps.push(location_step());
            }
            if transition || date_changed {
                steps.push(HearingStep::UpdateDateTime(new.starts_at));
            }
        }
        HearingStatus::Active => {
            if transition || location_changed {
                steps.push(location_step());
            }
            if transition || date_changed {
                steps.push(HearingStep::UpdateDateTime(new.starts_at));
            }
            if transition {
                steps.push(HearingStep::SetStatus(HearingStatus::Active));
            }
        }
    }
    steps
}

/// Snapshot to persist once every planned step has succeeded
pub fn snapshot_of(
    hearing: &NearestHearing,
    board_id: &str,
    now: DateTime<Utc>,
) -> HearingSnapshot {
    HearingSnapshot {
        source_id: hearing.case_id,
        board_id: board_id.to_string(),
        starts_at: hearing.starts_at,
        status: hearing.status.code(),
        judge: hearing.judge.clone(),
        city: hearing.city.clone(),
        updated_at: now,
    }
}
