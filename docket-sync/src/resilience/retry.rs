//! Retry with backoff and jitter
//!
//! Attempt index 0, 1, 2 map to base delays 1s, 4s, 12s; later attempts reuse
//! 12s. Each delay is scaled by a random factor in [0.75, 1.25]. An explicit
//! retry-after hint from the upstream replaces the backoff, capped at 60s.
//!
//! Only transient failures are retried. Every failed attempt is reported to
//! the circuit breaker and every success resets it.

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::circuit_breaker::CircuitBreaker;
use crate::error::{SyncError, SyncResult};

/// Failed operation together with the number of attempts it consumed
#[derive(Debug)]
pub struct RetryFailure {
    pub error: SyncError,
    pub attempts: u32,
}

impl RetryFailure {
    fn new(error: SyncError, attempts: u32) -> Self {
        Self { error, attempts }
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Attempt ceiling, including the first attempt
    pub max_attempts: u32,
    /// Base delays for attempt indices 0, 1 and 2+
    pub base_delays: [Duration; 3],
    /// Maximum relative jitter (0.25 = ±25%)
    pub jitter: f64,
    /// Upper bound applied to upstream retry-after hints
    pub retry_after_cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delays: [
                Duration::from_secs(1),
                Duration::from_secs(4),
                Duration::from_secs(12),
            ],
            jitter: 0.25,
            retry_after_cap: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Same delays, one attempt only. For calls that must never be repeated blindly.
    pub fn single_attempt(&self) -> Self {
        Self {
            max_attempts: 1,
            ..self.clone()
        }
    }

    /// Base delay before jitter
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let index = (attempt as usize).min(self.base_delays.len() - 1);
        self.base_delays[index]
    }

    /// Jittered backoff for a 0-indexed attempt
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt).as_secs_f64();
        let factor = if self.jitter > 0.0 {
            1.0 + rand::thread_rng().gen_range(-self.jitter..=self.jitter)
        } else {
            1.0
        };
        Duration::from_secs_f64(base * factor)
    }

    /// Delay before the next attempt, honoring an upstream hint
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        match retry_after {
            Some(hint) => hint.min(self.retry_after_cap),
            None => self.backoff_delay(attempt),
        }
    }

    /// Run `op` until it succeeds, fails non-transiently, exhausts the attempt
    /// ceiling, trips the breaker, or is cancelled.
    ///
    /// Cancellation is checked before and after every call and during backoff
    /// sleeps; an in-flight call is never dropped midway.
    pub async fn run<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        breaker: &mut CircuitBreaker,
        mut op: F,
    ) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<T>>,
    {
        let mut attempts = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(RetryFailure::new(SyncError::Cancelled, attempts));
            }
            if breaker.is_open() {
                return Err(RetryFailure::new(SyncError::CircuitOpen, attempts));
            }

            let result = op().await;
            attempts += 1;

            let error = match result {
                Ok(value) => {
                    breaker.record_success();
                    if attempts > 1 {
                        debug!(operation, attempts, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(error) => error,
            };

            breaker.record_failure();
            let class = error.class();

            if !class.is_retryable() || attempts >= self.max_attempts || breaker.is_open() {
                warn!(
                    operation,
                    attempts,
                    error_class = %class,
                    error = %error,
                    "Operation failed, giving up"
                );
                return Err(RetryFailure::new(error, attempts));
            }
            if cancel.is_cancelled() {
                return Err(RetryFailure::new(SyncError::Cancelled, attempts));
            }

            let delay = self.delay_for(attempts - 1, error.retry_after());
            warn!(
                operation,
                attempt = attempts,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Transient failure, will retry after backoff"
            );

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(RetryFailure::new(SyncError::Cancelled, attempts));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
