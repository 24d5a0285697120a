//! Reconciliation engine
//!
//! A full pass, in order:
//! 1. claim the run lock (skip the run if another live holder owns it)
//! 2. bootstrap: onboard newly eligible cases
//! 3. reconcile: reload every eligible mapped case, update the ones whose
//!    content version changed
//! 4. hearings: reconcile the nearest hearing of every eligible mapped case
//! 5. persist run metrics and release the lock
//!
//! Cases are processed one at a time. Cancellation is checked between cases
//! and around every external call. A per-case failure is dead-lettered and
//! the pass continues; only store or source failures abort the pass.

mod bootstrap;
mod cases;
mod hearings;
pub mod stats;

pub use stats::RunStats;

use chrono::{DateTime, NaiveDate, Utc};
use docket_common::config::SyncConfig;
use docket_common::db::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};
use docket_common::events::{EventBus, SyncEvent};
use sqlx::SqlitePool;
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::db::{failures, mappings, metrics};
use crate::eligibility::{eligible_mapped, is_after_cutoff, BootstrapPolicy, Eligibility};
use crate::error::{BoardError, SyncError, SyncResult};
use crate::metadata::MetadataCache;
use crate::models::CaseRecord;
use crate::ports::{BoardClient, BoardSchema, SourceReader};
use crate::resilience::{run_lock, CircuitBreaker, RetryFailure, RetryPolicy};
use crate::versioning::ContentVersioner;

/// Board column holding the hearing status label
pub const HEARING_STATUS_COLUMN: &str = "Hearing Status";

/// Maximum ids per source fetch
const LOAD_BATCH_SIZE: usize = 200;

/// Wall clock used by the engine
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Engine settings derived from `[sync]`
#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub board_id: String,
    pub cutoff: NaiveDate,
    pub cooling_business_days: u32,
    pub max_attempts: u32,
    pub breaker_threshold: u32,
    pub run_lock_ttl: chrono::Duration,
    pub metadata_ttl: std::time::Duration,
    pub versioner: ContentVersioner,
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> docket_common::Result<Self> {
        config.validate()?;
        let versioner = match &config.tracked_fields {
            Some(names) => ContentVersioner::from_names(names.as_slice())
                .map_err(|reason| docket_common::Error::InvalidSetting {
                    key: "sync.tracked_fields",
                    reason,
                })?,
            None => ContentVersioner::default(),
        };

        Ok(Self {
            board_id: config.board_id.trim().to_string(),
            cutoff: config.cutoff()?,
            cooling_business_days: config.cooling_business_days,
            max_attempts: config.max_attempts,
            breaker_threshold: config.breaker_threshold,
            run_lock_ttl: chrono::Duration::seconds(config.run_lock_ttl_secs as i64),
            metadata_ttl: std::time::Duration::from_secs(config.metadata_ttl_secs),
            versioner,
        })
    }

    pub fn bootstrap_policy(&self) -> BootstrapPolicy {
        BootstrapPolicy::new(self.cutoff, self.cooling_business_days)
    }
}

/// Collaborators and shared state injected into the engine
#[derive(Clone)]
pub struct SyncDeps {
    pub pool: SqlitePool,
    pub source: Arc<dyn SourceReader>,
    pub board: Arc<dyn BoardClient>,
    pub metadata: Arc<MetadataCache>,
    pub events: EventBus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Another run holds the lock; nothing was done
    Skipped { holder: Option<String> },
    Completed { run_id: String, stats: RunStats },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReprocessOutcome {
    Skipped { holder: Option<String> },
    UnknownCase,
    Ineligible(Eligibility),
    Processed { run_id: String, stats: RunStats },
}

/// Process-local state of one run
pub(crate) struct RunContext {
    run_id: String,
    started_at: DateTime<Utc>,
    last_renewed: DateTime<Utc>,
    stats: RunStats,
    breaker: CircuitBreaker,
    /// Items already written this pass
    written_items: HashSet<String>,
    /// Cases created this pass; the reconcile step skips them
    onboarded: HashSet<i64>,
}

enum RunStart {
    Started(RunContext),
    Held(Option<String>),
}

/// A per-case operation that did not succeed
#[derive(Debug)]
pub(crate) struct CaseFailure {
    operation: &'static str,
    error: SyncError,
    attempts: u32,
}

impl CaseFailure {
    fn new(operation: &'static str, error: SyncError, attempts: u32) -> Self {
        Self {
            operation,
            error,
            attempts,
        }
    }

    fn from_retry(operation: &'static str, failure: RetryFailure) -> Self {
        Self::new(operation, failure.error, failure.attempts)
    }

    fn store(operation: &'static str, error: docket_common::Error) -> Self {
        Self::new(operation, SyncError::Store(error), 0)
    }
}

pub struct SyncEngine {
    deps: SyncDeps,
    settings: SyncSettings,
    retry: RetryPolicy,
    clock: Clock,
}

impl SyncEngine {
    pub fn new(deps: SyncDeps, settings: SyncSettings) -> Self {
        let retry = RetryPolicy::with_max_attempts(settings.max_attempts);
        Self {
            deps,
            settings,
            retry,
            clock: Arc::new(Utc::now),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.deps.pool
    }

    fn now(&self) -> DateTime<Utc> {
        (self.clock)()
    }

    /// Full pass: bootstrap, reconcile, hearings
    pub async fn run_once(&self, cancel: &CancellationToken) -> SyncResult<RunOutcome> {
        let mut run = match self.begin_run().await? {
            RunStart::Started(run) => run,
            RunStart::Held(holder) => return Ok(RunOutcome::Skipped { holder }),
        };

        let result = self.full_pass(&mut run, cancel).await;
        let run_id = run.run_id.clone();
        let stats = self.finish_run(run, result).await?;
        Ok(RunOutcome::Completed { run_id, stats })
    }

    /// Hearing-only pass over the eligible mapped universe
    pub async fn run_hearings(&self, cancel: &CancellationToken) -> SyncResult<RunOutcome> {
        let mut run = match self.begin_run().await? {
            RunStart::Started(run) => run,
            RunStart::Held(holder) => return Ok(RunOutcome::Skipped { holder }),
        };

        let result: SyncResult<()> = async {
            let universe = self.eligible_universe(cancel).await?;
            self.hearing_pass(&mut run, &universe, cancel).await
        }
        .await;
        let run_id = run.run_id.clone();
        let stats = self.finish_run(run, result).await?;
        Ok(RunOutcome::Completed { run_id, stats })
    }

    /// Operator-triggered processing of one case by its human-readable number
    pub async fn reprocess_case(
        &self,
        case_number: &str,
        cancel: &CancellationToken,
    ) -> SyncResult<ReprocessOutcome> {
        let source = self.deps.source.as_ref();
        let case_number = case_number.trim();

        let case_id = self
            .read_with_retry("resolve_case_number", cancel, move || {
                source.resolve_case_number(case_number)
            })
            .await?;
        let Some(case_id) = case_id else {
            info!(case_number, "Reprocess requested for unknown case number");
            return Ok(ReprocessOutcome::UnknownCase);
        };

        let ids = [case_id];
        let ids = &ids[..];
        let records = self
            .read_with_retry("fetch_by_ids", cancel, move || source.fetch_by_ids(ids))
            .await?;
        let Some(record) = records.into_iter().find(|r| r.id == case_id) else {
            return Ok(ReprocessOutcome::UnknownCase);
        };

        let mut run = match self.begin_run().await? {
            RunStart::Started(run) => run,
            RunStart::Held(holder) => return Ok(ReprocessOutcome::Skipped { holder }),
        };

        let result = self.reprocess_pass(&mut run, &record, cancel).await;
        let (result, ineligible) = match result {
            Ok(ineligible) => (Ok(()), ineligible),
            Err(e) => (Err(e), None),
        };
        let run_id = run.run_id.clone();
        let stats = self.finish_run(run, result).await?;

        Ok(match ineligible {
            Some(eligibility) => ReprocessOutcome::Ineligible(eligibility),
            None => ReprocessOutcome::Processed { run_id, stats },
        })
    }

    async fn full_pass(&self, run: &mut RunContext, cancel: &CancellationToken) -> SyncResult<()> {
        let schema = self.board_schema(cancel).await?;
        self.bootstrap_pass(run, &schema, cancel).await?;

        let universe = self.eligible_universe(cancel).await?;
        self.reconcile_pass(run, &universe, &schema, cancel).await?;
        self.hearing_pass(run, &universe, cancel).await
    }

    async fn reprocess_pass(
        &self,
        run: &mut RunContext,
        record: &CaseRecord,
        cancel: &CancellationToken,
    ) -> SyncResult<Option<Eligibility>> {
        let schema = self.board_schema(cancel).await?;

        match mappings::get(&self.deps.pool, record.id).await? {
            Some(mapping) => {
                if !is_after_cutoff(record.created_at, self.settings.cutoff) {
                    run.stats.skipped_ineligible += 1;
                    return Ok(Some(Eligibility::BeforeCutoff));
                }
                if let Err(failure) = self
                    .reconcile_case(run, record, &mapping, &schema, cancel)
                    .await
                {
                    self.handle_case_failure(run, record.id, failure).await?;
                    return Ok(None);
                }
            }
            None => {
                let today = self.now().date_naive();
                match self
                    .settings
                    .bootstrap_policy()
                    .evaluate(record, &HashSet::new(), today)
                {
                    Eligibility::Eligible => {
                        if let Err(failure) = self.onboard_case(run, record, &schema, cancel).await {
                            self.handle_case_failure(run, record.id, failure).await?;
                            return Ok(None);
                        }
                        // An adopted item still needs its values written
                        if !run.onboarded.contains(&record.id) {
                            if let Some(mapping) = mappings::get(&self.deps.pool, record.id).await? {
                                if let Err(failure) = self
                                    .reconcile_case(run, record, &mapping, &schema, cancel)
                                    .await
                                {
                                    self.handle_case_failure(run, record.id, failure).await?;
                                    return Ok(None);
                                }
                            }
                        }
                    }
                    other => {
                        run.stats.skipped_ineligible += 1;
                        return Ok(Some(other));
                    }
                }
            }
        }

        let universe: BTreeSet<i64> = [record.id].into_iter().collect();
        self.hearing_pass(run, &universe, cancel).await?;

        if run.stats.failed == 0 {
            self.resolve_failures(record.id).await;
        }
        Ok(None)
    }

    async fn begin_run(&self) -> SyncResult<RunStart> {
        let run_id = Uuid::new_v4().to_string();
        let now = self.now();
        let pool = &self.deps.pool;

        if !run_lock::try_acquire(pool, &run_id, now, self.settings.run_lock_ttl).await? {
            let holder = run_lock::current_holder(pool, now)
                .await?
                .map(|h| h.holder);
            info!(run_id = %run_id, holder = ?holder, "Run lock held elsewhere, skipping run");
            self.deps.events.emit_lossy(SyncEvent::RunSkipped {
                run_id,
                holder: holder.clone(),
                timestamp: now,
            });
            return Ok(RunStart::Held(holder));
        }

        info!(run_id = %run_id, board_id = %self.settings.board_id, "Run started");
        self.deps.events.emit_lossy(SyncEvent::RunStarted {
            run_id: run_id.clone(),
            timestamp: now,
        });

        Ok(RunStart::Started(RunContext {
            run_id,
            started_at: now,
            last_renewed: now,
            stats: RunStats::default(),
            breaker: CircuitBreaker::new(self.settings.breaker_threshold),
            written_items: HashSet::new(),
            onboarded: HashSet::new(),
        }))
    }

    /// Persist metrics and release the lock, then surface the pass result
    async fn finish_run(&self, run: RunContext, result: SyncResult<()>) -> SyncResult<RunStats> {
        let finished_at = self.now();
        let pool = &self.deps.pool;
        let run_metrics = run
            .stats
            .to_metrics(&run.run_id, run.started_at, finished_at);

        let persisted = retry_on_lock("insert_run_metrics", DEFAULT_MAX_LOCK_WAIT_MS, || {
            metrics::insert_run_metrics(pool, &run_metrics)
        })
        .await;
        let released = retry_on_lock("release_run_lock", DEFAULT_MAX_LOCK_WAIT_MS, || {
            run_lock::release(pool, &run.run_id)
        })
        .await;

        match &result {
            Ok(()) => info!(
                run_id = %run.run_id,
                created = run.stats.created,
                updated = run.stats.updated,
                skipped_unchanged = run.stats.skipped_unchanged,
                skipped_ineligible = run.stats.skipped_ineligible,
                skipped_duplicate = run.stats.skipped_duplicate,
                skipped_circuit_open = run.stats.skipped_circuit_open,
                failed = run.stats.failed,
                hearing_updates = run.stats.hearing_updates,
                duration_ms = run_metrics.duration_ms,
                "Run completed"
            ),
            Err(SyncError::Cancelled) => warn!(run_id = %run.run_id, "Run cancelled"),
            Err(e) => error!(run_id = %run.run_id, error = %e, "Run aborted"),
        }

        result?;
        persisted?;
        if !released? {
            warn!(run_id = %run.run_id, "Run lock was not held at release");
        }

        self.deps.events.emit_lossy(SyncEvent::RunCompleted {
            run_id: run.run_id,
            created: run.stats.created,
            updated: run.stats.updated,
            failed: run.stats.failed,
            duration_ms: run_metrics.duration_ms,
            timestamp: finished_at,
        });
        Ok(run.stats)
    }

    /// Eligible source ids intersected with mapped ids
    async fn eligible_universe(&self, cancel: &CancellationToken) -> SyncResult<BTreeSet<i64>> {
        let source = self.deps.source.as_ref();
        let cutoff = self.settings.cutoff;

        let eligible_ids = self
            .read_with_retry("list_ids_created_since", cancel, move || {
                source.list_ids_created_since(cutoff)
            })
            .await?;
        let mapped = mappings::list_source_ids(&self.deps.pool, &self.settings.board_id).await?;

        let universe = eligible_mapped(eligible_ids, &mapped);
        debug!(
            eligible_mapped = universe.len(),
            mapped = mapped.len(),
            "Computed eligible mapped universe"
        );
        Ok(universe)
    }

    async fn board_schema(&self, cancel: &CancellationToken) -> SyncResult<Arc<BoardSchema>> {
        let metadata = self.deps.metadata.as_ref();
        let board_id = self.settings.board_id.as_str();
        let ttl = self.settings.metadata_ttl;

        self.read_with_retry("fetch_board_metadata", cancel, move || {
            metadata.get_or_refresh(board_id, ttl)
        })
        .await
    }

    /// Retried read whose failure aborts the pass. Reads never feed the breaker.
    async fn read_with_retry<T, E, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut f: F,
    ) -> SyncResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<SyncError>,
    {
        let mut breaker = CircuitBreaker::disabled();
        self.retry
            .run(operation, cancel, &mut breaker, || {
                let fut = f();
                async move { fut.await.map_err(Into::into) }
            })
            .await
            .map_err(|failure| failure.error)
    }

    /// Board call under the run's breaker
    async fn board_call<T, F, Fut>(
        &self,
        run: &mut RunContext,
        operation: &'static str,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
        mut f: F,
    ) -> Result<T, CaseFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, BoardError>>,
    {
        let was_open = run.breaker.is_open();
        let result = policy
            .run(operation, cancel, &mut run.breaker, || {
                let fut = f();
                async move { fut.await.map_err(SyncError::from) }
            })
            .await;

        if !was_open && run.breaker.is_open() {
            run.stats.breaker_tripped = true;
            warn!(
                run_id = %run.run_id,
                consecutive_failures = run.breaker.consecutive_failures(),
                "Circuit breaker opened, abandoning remaining writes this run"
            );
            self.deps.events.emit_lossy(SyncEvent::CircuitOpened {
                run_id: run.run_id.clone(),
                consecutive_failures: run.breaker.consecutive_failures(),
            });
        }

        result.map_err(|failure| CaseFailure::from_retry(operation, failure))
    }

    /// Between cases: honor cancellation and keep the run lock alive
    async fn before_case(&self, run: &mut RunContext, cancel: &CancellationToken) -> SyncResult<()> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let now = self.now();
        let ttl = self.settings.run_lock_ttl;
        if now - run.last_renewed >= ttl / 3 {
            if !run_lock::renew(&self.deps.pool, &run.run_id, now, ttl).await? {
                return Err(SyncError::LockLost);
            }
            run.last_renewed = now;
        }
        Ok(())
    }

    /// Dead-letter a failed case. Cancellation and lock loss end the pass.
    async fn handle_case_failure(
        &self,
        run: &mut RunContext,
        source_id: i64,
        failure: CaseFailure,
    ) -> SyncResult<()> {
        match failure.error {
            SyncError::Cancelled => return Err(SyncError::Cancelled),
            SyncError::LockLost => return Err(SyncError::LockLost),
            SyncError::CircuitOpen => {
                debug!(run_id = %run.run_id, source_id, operation = failure.operation, "Skipped, circuit open");
                run.stats.skipped_circuit_open += 1;
                return Ok(());
            }
            _ => {}
        }

        let class = failure.error.class();
        warn!(
            run_id = %run.run_id,
            source_id,
            operation = failure.operation,
            error_class = %class,
            attempts = failure.attempts,
            error = %failure.error,
            "Case failed, recorded in dead-letter log"
        );

        let entry = failures::NewFailure {
            run_id: run.run_id.clone(),
            source_id: Some(source_id),
            operation: failure.operation.to_string(),
            error_class: class.as_str().to_string(),
            message: failure.error.to_string(),
            trace: Some(format!("{:?}", failure.error)),
            attempts: failure.attempts,
            created_at: self.now(),
        };
        retry_on_lock("record_failure", DEFAULT_MAX_LOCK_WAIT_MS, || {
            failures::record(&self.deps.pool, &entry)
        })
        .await?;

        run.stats.failed += 1;
        self.deps.events.emit_lossy(SyncEvent::CaseFailed {
            run_id: run.run_id.clone(),
            source_id,
            operation: failure.operation.to_string(),
            error_class: class.as_str().to_string(),
        });
        Ok(())
    }

    /// Mark earlier failures of a case resolved after it processed cleanly
    async fn resolve_failures(&self, source_id: i64) {
        match failures::resolve_for_source(&self.deps.pool, source_id, self.now()).await {
            Ok(0) => {}
            Ok(resolved) => info!(source_id, resolved, "Resolved dead-letter entries"),
            Err(e) => warn!(source_id, error = %e, "Failed to resolve dead-letter entries"),
        }
    }
}
