//! Sync event types and broadcast bus
//!
//! The engine publishes run lifecycle events here; subscribers (tests, the
//! operator API, future push channels) receive everything emitted after they
//! subscribe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Events emitted by the reconciliation engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Run lock acquired, work starting
    RunStarted {
        run_id: String,
        timestamp: DateTime<Utc>,
    },

    /// Another holder owns the run lock; nothing was done
    RunSkipped {
        run_id: String,
        holder: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A board item was created for a newly onboarded case
    CaseCreated {
        run_id: String,
        source_id: i64,
        item_id: String,
    },

    /// A mapped case changed and its item was updated
    CaseUpdated {
        run_id: String,
        source_id: i64,
        item_id: String,
    },

    /// A per-case operation failed and was dead-lettered
    CaseFailed {
        run_id: String,
        source_id: i64,
        operation: String,
        error_class: String,
    },

    /// Consecutive failures reached the threshold; remaining writes abandoned
    CircuitOpened {
        run_id: String,
        consecutive_failures: u32,
    },

    /// Run finished and metrics were persisted
    RunCompleted {
        run_id: String,
        created: i64,
        updated: i64,
        failed: i64,
        duration_ms: i64,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`SyncEvent`]
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SyncEvent>,
    capacity: usize,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per lagging subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Emit an event; fails when nobody is subscribed
    #[allow(clippy::result_large_err)]
    pub fn emit(&self, event: SyncEvent) -> Result<usize, broadcast::error::SendError<SyncEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring the no-subscriber case
    pub fn emit_lossy(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
