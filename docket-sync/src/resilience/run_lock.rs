//! Singleton run lock
//!
//! At most one reconciliation run holds the lock at a time. The holder is the
//! run id; the lock lapses at `expires_at` so a crashed run cannot block
//! later runs forever. Acquisition is a single conditional UPDATE, so two
//! processes sharing the state store cannot both win.

use chrono::{DateTime, Duration, Utc};
use docket_common::db::RunLockHolder;
use docket_common::time::{from_db_timestamp, to_db_timestamp};
use docket_common::Result;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

/// Try to take the lock for `run_id`. Returns false when a live holder exists.
pub async fn try_acquire(
    pool: &SqlitePool,
    run_id: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<bool> {
    let now_str = to_db_timestamp(now);
    let expires = to_db_timestamp(now + ttl);

    let result = sqlx::query(
        r#"
        UPDATE run_lock
        SET holder = ?, acquired_at = ?, expires_at = ?
        WHERE id = 1
          AND (holder IS NULL OR expires_at IS NULL OR expires_at <= ?)
        "#,
    )
    .bind(run_id)
    .bind(&now_str)
    .bind(&expires)
    .bind(&now_str)
    .execute(pool)
    .await?;

    let acquired = result.rows_affected() == 1;
    if acquired {
        info!(run_id, expires_at = %expires, "Run lock acquired");
    } else {
        debug!(run_id, "Run lock held by another run");
    }
    Ok(acquired)
}

/// Push the expiry of a held lock forward. Returns false if `run_id` lost it.
pub async fn renew(
    pool: &SqlitePool,
    run_id: &str,
    now: DateTime<Utc>,
    ttl: Duration,
) -> Result<bool> {
    let result = sqlx::query("UPDATE run_lock SET expires_at = ? WHERE id = 1 AND holder = ?")
        .bind(to_db_timestamp(now + ttl))
        .bind(run_id)
        .execute(pool)
        .await?;

    let renewed = result.rows_affected() == 1;
    if !renewed {
        warn!(run_id, "Run lock renewal failed: no longer the holder");
    }
    Ok(renewed)
}

/// Release the lock if `run_id` still holds it
pub async fn release(pool: &SqlitePool, run_id: &str) -> Result<bool> {
    let result = sqlx::query(
        r#"
        UPDATE run_lock
        SET holder = NULL, acquired_at = NULL, expires_at = NULL
        WHERE id = 1 AND holder = ?
        "#,
    )
    .bind(run_id)
    .execute(pool)
    .await?;

    let released = result.rows_affected() == 1;
    if released {
        info!(run_id, "Run lock released");
    }
    Ok(released)
}

/// Live holder of the lock, if any. Expired holders are reported as none.
pub async fn current_holder(pool: &SqlitePool, now: DateTime<Utc>) -> Result<Option<RunLockHolder>> {
    let row = sqlx::query("SELECT holder, acquired_at, expires_at FROM run_lock WHERE id = 1")
        .fetch_optional(pool)
        .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let holder: Option<String> = row.get("holder");
    let acquired_at: Option<String> = row.get("acquired_at");
    let expires_at: Option<String> = row.get("expires_at");

    let (Some(holder), Some(acquired_at), Some(expires_at)) = (holder, acquired_at, expires_at)
    else {
        return Ok(None);
    };

    let expires_at = from_db_timestamp(&expires_at)?;
    if expires_at <= now {
        return Ok(None);
    }

    Ok(Some(RunLockHolder {
        holder,
        acquired_at: from_db_timestamp(&acquired_at)?,
        expires_at,
    }))
}
