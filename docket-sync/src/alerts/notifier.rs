//! Alert delivery task
//!
//! The sync loop hands alerts to [`AlertNotifier::enqueue`], which never
//! blocks: a full queue drops the alert with a warning. [`AlertWorker::run`]
//! drains the queue on its own task, gates each alert, delivers through an
//! [`AlertTransport`], and periodically flushes a run summary plus a digest
//! of suppressed fingerprints.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docket_common::db::AlertDedupRecord;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::dedup::{AlertDecision, AlertGate};
use super::Alert;
use crate::db::metrics::{self, MetricsSummary};

/// One message handed to the transport
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Incident {
        alert: Alert,
        fingerprint: String,
    },
    DailySummary {
        since: DateTime<Utc>,
        summary: MetricsSummary,
    },
    IncidentDigest {
        since: DateTime<Utc>,
        entries: Vec<AlertDedupRecord>,
    },
}

impl OutboundMessage {
    pub fn subject(&self) -> String {
        match self {
            OutboundMessage::Incident { alert, .. } => {
                format!("[{}] {}", alert.source_component, alert.exception_type)
            }
            OutboundMessage::DailySummary { summary, .. } => {
                format!("Sync summary: {} runs, {} failed", summary.runs, summary.failed)
            }
            OutboundMessage::IncidentDigest { entries, .. } => {
                format!("Suppressed alerts: {} fingerprints", entries.len())
            }
        }
    }
}

/// Delivery channel for operator notifications
#[async_trait]
pub trait AlertTransport: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), String>;
}

/// Writes notifications to the log instead of mailing them
pub struct LogTransport;

#[async_trait]
impl AlertTransport for LogTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<(), String> {
        match message {
            OutboundMessage::Incident { alert, fingerprint } => error!(
                fingerprint = %fingerprint,
                exception_type = %alert.exception_type,
                source_component = %alert.source_component,
                "ALERT: {}",
                alert.message
            ),
            OutboundMessage::DailySummary { since, summary } => info!(
                since = %since,
                runs = summary.runs,
                created = summary.created,
                updated = summary.updated,
                failed = summary.failed,
                breaker_trips = summary.breaker_trips,
                "{}",
                message.subject()
            ),
            OutboundMessage::IncidentDigest { entries, .. } => {
                for entry in entries {
                    warn!(
                        fingerprint = %entry.fingerprint,
                        suppressed = entry.suppressed_since_send,
                        occurrences = entry.occurrence_count,
                        "Suppressed alert: {}",
                        entry.sample_message
                    );
                }
            }
        }
        Ok(())
    }
}

/// Non-blocking producer handle
#[derive(Clone)]
pub struct AlertNotifier {
    tx: mpsc::Sender<Alert>,
}

impl AlertNotifier {
    /// Bounded queue plus the worker that drains it
    pub fn new(
        capacity: usize,
        gate: Arc<AlertGate>,
        transport: Arc<dyn AlertTransport>,
        pool: SqlitePool,
        summary_interval: Duration,
    ) -> (Self, AlertWorker) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let worker = AlertWorker {
            rx,
            gate,
            transport,
            pool,
            summary_interval,
            last_flush: Utc::now(),
        };
        (Self { tx }, worker)
    }

    /// Queue an alert; returns false if it was dropped
    pub fn enqueue(&self, alert: Alert) -> bool {
        match self.tx.try_send(alert) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(alert)) => {
                warn!(
                    exception_type = %alert.exception_type,
                    "Alert queue full, dropping alert"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Alert worker stopped, dropping alert");
                false
            }
        }
    }
}

pub struct AlertWorker {
    rx: mpsc::Receiver<Alert>,
    gate: Arc<AlertGate>,
    transport: Arc<dyn AlertTransport>,
    pool: SqlitePool,
    summary_interval: Duration,
    last_flush: DateTime<Utc>,
}

impl AlertWorker {
    pub async fn run(mut self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.summary_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        info!("Alert worker started");
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = self.rx.recv() => match received {
                    Some(alert) => self.deliver(alert).await,
                    None => break,
                },
                _ = ticker.tick() => self.flush_summary(Utc::now()).await,
            }
        }

        // Deliver what was already queued before shutdown
        while let Ok(alert) = self.rx.try_recv() {
            self.deliver(alert).await;
        }
        info!("Alert worker stopped");
    }

    async fn deliver(&self, alert: Alert) {
        let now = Utc::now();
        let decision = match self.gate.evaluate(&alert, now).await {
            Ok(decision) => decision,
            Err(e) => {
                error!(error = %e, "Alert gate failed, alert not delivered");
                return;
            }
        };

        match decision {
            AlertDecision::Send { fingerprint } => {
                let message = OutboundMessage::Incident {
                    alert,
                    fingerprint: fingerprint.clone(),
                };
                match self.transport.send(&message).await {
                    Ok(()) => {
                        if let Err(e) = self.gate.record_sent(&fingerprint, Utc::now()).await {
                            warn!(fingerprint = %fingerprint, error = %e, "Failed to record alert send");
                        }
                    }
                    Err(e) => warn!(fingerprint = %fingerprint, error = %e, "Alert delivery failed"),
                }
            }
            AlertDecision::Duplicate { fingerprint } => {
                debug!(fingerprint = %fingerprint, "Duplicate alert suppressed");
            }
            AlertDecision::RateLimited { fingerprint } => {
                warn!(fingerprint = %fingerprint, "Alert suppressed by hourly cap");
            }
        }
    }

    async fn flush_summary(&mut self, now: DateTime<Utc>) {
        let since = self.last_flush;

        match metrics::aggregate_since(&self.pool, since).await {
            Ok(summary) => {
                let message = OutboundMessage::DailySummary { since, summary };
                if let Err(e) = self.transport.send(&message).await {
                    warn!(error = %e, "Summary delivery failed");
                }
            }
            Err(e) => warn!(error = %e, "Failed to aggregate run metrics for summary"),
        }

        match self.gate.digest(since).await {
            Ok(entries) if !entries.is_empty() => {
                let message = OutboundMessage::IncidentDigest { since, entries };
                if let Err(e) = self.transport.send(&message).await {
                    warn!(error = %e, "Digest delivery failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to build incident digest"),
        }

        self.last_flush = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertPolicy;
    use docket_common::db::init_memory_database;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingTransport {
        sent: Mutex<Vec<OutboundMessage>>,
    }

    #[async_trait]
    impl AlertTransport for RecordingTransport {
        async fn send(&self, message: &OutboundMessage) -> Result<(), String> {
            self.sent.lock().unwrap().push(message.clone());
            Ok(())
        }
    }

    async fn setup(capacity: usize) -> (AlertNotifier, AlertWorker, Arc<RecordingTransport>) {
        let pool = init_memory_database().await.unwrap();
        let gate = Arc::new(AlertGate::new(pool.clone(), AlertPolicy::default()));
        let transport = Arc::new(RecordingTransport::default());
        let (notifier, worker) = AlertNotifier::new(
            capacity,
            gate,
            transport.clone(),
            pool,
            Duration::from_secs(3600),
        );
        (notifier, worker, transport)
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let (notifier, _worker, _transport) = setup(1).await;
        assert!(notifier.enqueue(Alert::new("A", "first", "docket-sync")));
        assert!(!notifier.enqueue(Alert::new("A", "second", "docket-sync")));
    }

    #[tokio::test]
    async fn test_worker_delivers_once_per_fingerprint() {
        let (notifier, worker, transport) = setup(10).await;
        let cancel = CancellationToken::new();

        for id in [1001, 1002, 1003] {
            notifier.enqueue(Alert::new(
                "BoardError::Network",
                format!("case {} reset", id),
                "docket-sync",
            ));
        }
        notifier.enqueue(Alert::new("StoreError", "disk full", "docket-sync"));
        drop(notifier);

        // Channel closed after the queued alerts drain
        worker.run(cancel).await;

        let sent = transport.sent.lock().unwrap();
        let incidents: Vec<_> = sent
            .iter()
            .filter(|m| matches!(m, OutboundMessage::Incident { .. }))
            .collect();
        assert_eq!(incidents.len(), 2);
    }

    #[tokio::test]
    async fn test_flush_sends_summary_and_digest() {
        let (notifier, mut worker, transport) = setup(10).await;
        let start = worker.last_flush;

        worker.deliver(Alert::new("A", "boom", "docket-sync")).await;
        worker.deliver(Alert::new("A", "boom", "docket-sync")).await;
        drop(notifier);

        worker.flush_summary(Utc::now()).await;

        let sent = transport.sent.lock().unwrap();
        assert!(sent
            .iter()
            .any(|m| matches!(m, OutboundMessage::DailySummary { since, .. } if *since == start)));
        assert!(sent.iter().any(
            |m| matches!(m, OutboundMessage::IncidentDigest { entries, .. } if entries.len() == 1)
        ));
    }
}
