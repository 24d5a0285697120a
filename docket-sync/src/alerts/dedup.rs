//! Alert dedup gate
//!
//! Decision rules, in order:
//! 1. A fingerprint that was actually sent within the dedup window is a
//!    duplicate. Never-sent fingerprints are never duplicates.
//! 2. An alert that would be sent takes a cell from an hourly GCRA budget of
//!    `hourly_cap` cells; with none left it is rate limited. Duplicates never
//!    take a cell. A cap of 0 disables the limit.
//! 3. Otherwise the alert is sent.
//!
//! The budget runs on a fake clock driven by the `now` passed to `evaluate`,
//! never moved backwards. Every evaluation counts an occurrence. The sync
//! loop and the delivery task share one gate; each read-modify-write runs
//! under its mutex.

use chrono::{DateTime, Duration, Utc};
use docket_common::config::AlertConfig;
use docket_common::db::AlertDedupRecord;
use docket_common::Result;
use governor::clock::{Clock, FakeRelativeClock};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use sqlx::SqlitePool;
use std::num::NonZeroU32;
use tokio::sync::Mutex;
use tracing::debug;

use super::Alert;
use crate::db::alert_dedup;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertPolicy {
    pub dedup_window: Duration,
    pub hourly_cap: u32,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            dedup_window: Duration::hours(1),
            hourly_cap: 20,
        }
    }
}

impl From<&AlertConfig> for AlertPolicy {
    fn from(config: &AlertConfig) -> Self {
        Self {
            dedup_window: Duration::seconds(config.dedup_window_secs as i64),
            hourly_cap: config.hourly_cap,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertDecision {
    Send { fingerprint: String },
    Duplicate { fingerprint: String },
    RateLimited { fingerprint: String },
}

impl AlertDecision {
    pub fn fingerprint(&self) -> &str {
        match self {
            AlertDecision::Send { fingerprint }
            | AlertDecision::Duplicate { fingerprint }
            | AlertDecision::RateLimited { fingerprint } => fingerprint,
        }
    }
}

type SendLimiter = RateLimiter<
    NotKeyed,
    InMemoryState,
    FakeRelativeClock,
    NoOpMiddleware<<FakeRelativeClock as Clock>::Instant>,
>;

/// Hourly send budget
struct SendBudget {
    limiter: SendLimiter,
    clock: FakeRelativeClock,
    last_seen: Option<DateTime<Utc>>,
}

impl SendBudget {
    /// None when `hourly_cap` is 0
    fn new(hourly_cap: u32) -> Option<Self> {
        let cap = NonZeroU32::new(hourly_cap)?;
        let clock = FakeRelativeClock::default();
        Some(Self {
            limiter: RateLimiter::direct_with_clock(Quota::per_hour(cap), clock.clone()),
            clock,
            last_seen: None,
        })
    }

    fn advance_to(&mut self, now: DateTime<Utc>) {
        match self.last_seen {
            Some(last) if now <= last => return,
            Some(last) => {
                if let Ok(elapsed) = (now - last).to_std() {
                    self.clock.advance(elapsed);
                }
            }
            None => {}
        }
        self.last_seen = Some(now);
    }

    fn try_take(&mut self, now: DateTime<Utc>) -> bool {
        self.advance_to(now);
        self.limiter.check().is_ok()
    }
}

pub struct AlertGate {
    pool: SqlitePool,
    policy: AlertPolicy,
    budget: Mutex<Option<SendBudget>>,
}

impl AlertGate {
    pub fn new(pool: SqlitePool, policy: AlertPolicy) -> Self {
        Self {
            pool,
            policy,
            budget: Mutex::new(SendBudget::new(policy.hourly_cap)),
        }
    }

    pub fn policy(&self) -> AlertPolicy {
        self.policy
    }

    /// Decide what to do with `alert` and count the occurrence
    pub async fn evaluate(&self, alert: &Alert, now: DateTime<Utc>) -> Result<AlertDecision> {
        let mut budget = self.budget.lock().await;
        let fingerprint = alert.fingerprint();

        let existing = alert_dedup::get(&self.pool, &fingerprint).await?;
        let recently_sent = existing
            .as_ref()
            .and_then(|r| r.last_sent_at)
            .is_some_and(|sent| now - sent < self.policy.dedup_window);

        let decision = if recently_sent {
            AlertDecision::Duplicate { fingerprint }
        } else if !budget.as_mut().map_or(true, |b| b.try_take(now)) {
            AlertDecision::RateLimited { fingerprint }
        } else {
            AlertDecision::Send { fingerprint }
        };

        let suppressed = !matches!(decision, AlertDecision::Send { .. });
        alert_dedup::record_occurrence(
            &self.pool,
            decision.fingerprint(),
            &alert.exception_type,
            &alert.source_component,
            &alert.message,
            suppressed,
            now,
        )
        .await?;

        debug!(fingerprint = decision.fingerprint(), ?decision, "Alert evaluated");
        Ok(decision)
    }

    /// Record a delivered alert
    pub async fn record_sent(&self, fingerprint: &str, now: DateTime<Utc>) -> Result<()> {
        let _guard = self.budget.lock().await;
        alert_dedup::mark_sent(&self.pool, fingerprint, now).await
    }

    /// Fingerprints with suppressed occurrences seen since `since`
    pub async fn digest(&self, since: DateTime<Utc>) -> Result<Vec<AlertDedupRecord>> {
        let _guard = self.budget.lock().await;
        alert_dedup::list_suppressed(&self.pool, since).await
    }
}
