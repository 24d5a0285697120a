//! Periodic sync loop
//!
//! One pass at a time: full passes every `full_interval`, hearing-only passes
//! every `hearing_interval` in between. Missed ticks are delayed, never
//! bursted. A failed pass is logged, handed to the alert notifier and the
//! loop waits for its next tick.

use docket_common::config::{AlertConfig, SyncConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::alerts::{Alert, AlertNotifier};
use crate::error::{SyncError, SyncResult};
use crate::reconcile::{RunOutcome, SyncEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassKind {
    Full,
    Hearings,
}

impl PassKind {
    fn as_str(&self) -> &'static str {
        match self {
            PassKind::Full => "full",
            PassKind::Hearings => "hearings",
        }
    }
}

pub struct Scheduler {
    engine: Arc<SyncEngine>,
    notifier: AlertNotifier,
    full_interval: Duration,
    hearing_interval: Duration,
    source_component: String,
}

impl Scheduler {
    pub fn new(
        engine: Arc<SyncEngine>,
        notifier: AlertNotifier,
        sync: &SyncConfig,
        alerts: &AlertConfig,
    ) -> Self {
        Self {
            engine,
            notifier,
            full_interval: Duration::from_secs(sync.interval_secs.max(1)),
            hearing_interval: Duration::from_secs(sync.hearing_interval_secs.max(1)),
            source_component: alerts.source_component.clone(),
        }
    }

    /// Run until `cancel` fires. The first full pass starts immediately.
    pub async fn run(self, cancel: CancellationToken) {
        let mut full = tokio::time::interval(self.full_interval);
        full.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut hearings = tokio::time::interval(self.hearing_interval);
        hearings.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // A full pass covers hearings too
        hearings.tick().await;

        info!(
            full_interval_secs = self.full_interval.as_secs(),
            hearing_interval_secs = self.hearing_interval.as_secs(),
            "Scheduler started"
        );

        loop {
            let kind = tokio::select! {
                _ = cancel.cancelled() => break,
                _ = full.tick() => PassKind::Full,
                _ = hearings.tick() => PassKind::Hearings,
            };
            self.run_pass(kind, &cancel).await;
            if kind == PassKind::Full {
                hearings.reset();
            }
        }

        info!("Scheduler stopped");
    }

    /// Execute one pass and route a run-level failure to the notifier
    pub async fn run_pass(&self, kind: PassKind, cancel: &CancellationToken) -> Option<RunOutcome> {
        let result: SyncResult<RunOutcome> = match kind {
            PassKind::Full => self.engine.run_once(cancel).await,
            PassKind::Hearings => self.engine.run_hearings(cancel).await,
        };

        match result {
            Ok(outcome) => {
                if let RunOutcome::Skipped { holder } = &outcome {
                    debug!(pass = kind.as_str(), holder = ?holder, "Pass skipped, run lock held");
                }
                Some(outcome)
            }
            Err(SyncError::Cancelled) => {
                info!(pass = kind.as_str(), "Pass cancelled");
                None
            }
            Err(e) => {
                error!(
                    pass = kind.as_str(),
                    error_kind = e.kind(),
                    error = %e,
                    "Sync pass failed"
                );
                self.notifier
                    .enqueue(Alert::from_error(&e, &self.source_component));
                None
            }
        }
    }
}
