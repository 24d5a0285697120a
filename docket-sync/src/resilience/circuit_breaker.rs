//! Consecutive-failure circuit breaker
//!
//! Scoped to a single run and owned by the sync loop. Once tripped it stays
//! open until the run ends; the next run starts with a fresh breaker.

use tracing::warn;

#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    /// Failures required to trip; 0 disables the breaker
    threshold: u32,
    consecutive_failures: u32,
    tripped: bool,
}

impl CircuitBreaker {
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold,
            consecutive_failures: 0,
            tripped: false,
        }
    }

    /// Breaker that never trips
    pub fn disabled() -> Self {
        Self::new(0)
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn is_open(&self) -> bool {
        self.tripped
    }

    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count one classified failure. Returns true if this failure tripped the breaker.
    pub fn record_failure(&mut self) -> bool {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.threshold == 0 || self.tripped {
            return false;
        }
        if self.consecutive_failures >= self.threshold {
            warn!(
                consecutive_failures = self.consecutive_failures,
                threshold = self.threshold,
                "Circuit breaker tripped, abandoning remaining writes for this run"
            );
            self.tripped = true;
            return true;
        }
        false
    }
}
