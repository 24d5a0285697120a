//! Lock-contention retry for state store writes
//!
//! SQLite reports `SQLITE_BUSY` ("database is locked") when a second writer
//! collides with the engine, e.g. the operator API resolving a failure while a
//! run is recording one. Those errors are retried with exponential backoff
//! (10ms doubling to 1s) until `max_wait_ms` has elapsed. Any other error is
//! returned immediately.

use std::time::{Duration, Instant};

use crate::{Error, Result};

/// Default total wait before giving up on a locked database
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// True when `err` is a transient SQLite lock collision
pub fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(sqlx::Error::Database(db_err)) => {
            matches!(db_err.code().as_deref(), Some("5") | Some("6"))
                || db_err.message().contains("database is locked")
        }
        Error::Database(other) => other.to_string().contains("database is locked"),
        _ => false,
    }
}

/// Retry `operation` while it fails with a lock error, up to `max_wait_ms`
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let start_time = Instant::now();
    let max_duration = Duration::from_millis(max_wait_ms);
    let mut attempt = 0u32;
    let mut backoff_ms = 10u64;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(result) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = start_time.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => err,
        };

        if !is_lock_error(&err) {
            return Err(err);
        }

        let elapsed = start_time.elapsed();
        if elapsed >= max_duration {
            tracing::error!(
                operation = operation_name,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                max_wait_ms,
                "Database operation failed: max retry time exceeded"
            );
            return Err(Error::StoreLocked {
                operation: operation_name.to_string(),
                attempts: attempt,
                elapsed_ms: elapsed.as_millis() as u64,
            });
        }

        tracing::warn!(
            operation = operation_name,
            attempt,
            elapsed_ms = elapsed.as_millis() as u64,
            backoff_ms,
            "Database locked, will retry after backoff"
        );

        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(1000);
    }
}
