//! Outbound error alerts
//!
//! Every alert passes a fingerprint gate before delivery: repeats of an
//! already-sent failure inside the dedup window are suppressed and counted,
//! and an hourly cap bounds total volume.

pub mod dedup;
pub mod fingerprint;
pub mod notifier;

pub use dedup::{AlertDecision, AlertGate, AlertPolicy};
pub use notifier::{AlertNotifier, AlertTransport, AlertWorker, LogTransport, OutboundMessage};

use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// A raised error on its way to the operators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alert {
    pub exception_type: String,
    pub message: String,
    pub source_component: String,
}

impl Alert {
    pub fn new(
        exception_type: impl Into<String>,
        message: impl Into<String>,
        source_component: impl Into<String>,
    ) -> Self {
        Self {
            exception_type: exception_type.into(),
            message: message.into(),
            source_component: source_component.into(),
        }
    }

    pub fn from_error(error: &SyncError, source_component: &str) -> Self {
        Self::new(error.kind(), error.to_string(), source_component)
    }

    pub fn fingerprint(&self) -> String {
        fingerprint::fingerprint(&self.exception_type, &self.message, &self.source_component)
    }
}
