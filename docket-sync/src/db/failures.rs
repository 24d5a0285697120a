//! Dead-letter failure log
//!
//! Append-only. A later success for the same source id flips `resolved`
//! on the existing rows instead of adding a contradictory one.

use chrono::{DateTime, Utc};
use docket_common::db::FailureRecord;
use docket_common::time::{from_db_timestamp, to_db_timestamp};
use docket_common::Result;
use serde::Deserialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::parse_optional_timestamp;

pub const MAX_MESSAGE_CHARS: usize = 2000;
pub const MAX_TRACE_CHARS: usize = 8000;

/// Failure about to be recorded
#[derive(Debug, Clone)]
pub struct NewFailure {
    pub run_id: String,
    pub source_id: Option<i64>,
    pub operation: String,
    pub error_class: String,
    pub message: String,
    pub trace: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
}

/// Dead-letter query filter
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FailureQuery {
    #[serde(default)]
    pub unresolved: bool,
    pub source_id: Option<i64>,
    pub limit: Option<u32>,
}

/// Truncate to at most `max_chars` characters, never splitting a character
pub fn truncate_chars(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &value[..byte_index],
        None => value,
    }
}

fn from_row(row: &SqliteRow) -> Result<FailureRecord> {
    let created_at: String = row.get("created_at");
    Ok(FailureRecord {
        id: row.get("id"),
        run_id: row.get("run_id"),
        source_id: row.get("source_id"),
        operation: row.get("operation"),
        error_class: row.get("error_class"),
        message: row.get("message"),
        trace: row.get("trace"),
        attempts: row.get::<i64, _>("attempts") as u32,
        resolved: row.get::<i64, _>("resolved") != 0,
        resolved_at: parse_optional_timestamp(row.get("resolved_at"))?,
        created_at: from_db_timestamp(&created_at)?,
    })
}

/// Append a failure; returns the new row id
pub async fn record(pool: &SqlitePool, failure: &NewFailure) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO failure_log (
            run_id, source_id, operation, error_class, message, trace, attempts, created_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&failure.run_id)
    .bind(failure.source_id)
    .bind(&failure.operation)
    .bind(&failure.error_class)
    .bind(truncate_chars(&failure.message, MAX_MESSAGE_CHARS))
    .bind(
        failure
            .trace
            .as_deref()
            .map(|t| truncate_chars(t, MAX_TRACE_CHARS)),
    )
    .bind(failure.attempts as i64)
    .bind(to_db_timestamp(failure.created_at))
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Mark every unresolved failure of `source_id` resolved; returns rows touched
pub async fn resolve_for_source(
    pool: &SqlitePool,
    source_id: i64,
    now: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE failure_log
        SET resolved = 1, resolved_at = ?
        WHERE source_id = ? AND resolved = 0
        "#,
    )
    .bind(to_db_timestamp(now))
    .bind(source_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Newest first
pub async fn list(pool: &SqlitePool, query: &FailureQuery) -> Result<Vec<FailureRecord>> {
    let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
        r#"
        SELECT id, run_id, source_id, operation, error_class, message, trace,
               attempts, resolved, resolved_at, created_at
        FROM failure_log
        WHERE 1 = 1
        "#,
    );

    if query.unresolved {
        builder.push(" AND resolved = 0");
    }
    if let Some(source_id) = query.source_id {
        builder.push(" AND source_id = ").push_bind(source_id);
    }
    builder
        .push(" ORDER BY id DESC LIMIT ")
        .push_bind(query.limit.unwrap_or(100).min(1000) as i64);

    let rows = builder.build().fetch_all(pool).await?;
    rows.iter().map(from_row).collect()
}

pub async fn count_unresolved(pool: &SqlitePool) -> Result<i64> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM failure_log WHERE resolved = 0")
        .fetch_one(pool)
        .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use docket_common::db::init_memory_database;

    fn failure(source_id: i64, message: &str) -> NewFailure {
        NewFailure {
            run_id: "run-1".to_string(),
            source_id: Some(source_id),
            operation: "update_item".to_string(),
            error_class: "transient".to_string(),
            message: message.to_string(),
            trace: None,
            attempts: 3,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("abc", 5), "abc");
        assert_eq!(truncate_chars("abcdef", 3), "abc");
        // Multi-byte characters
        assert_eq!(truncate_chars("שלום עולם", 4), "שלום");
    }

    #[tokio::test]
    async fn test_record_truncates_long_message() {
        let pool = init_memory_database().await.unwrap();
        let long = "x".repeat(MAX_MESSAGE_CHARS + 500);
        let trace = "t".repeat(MAX_TRACE_CHARS + 1);

        let id = record(
            &pool,
            &NewFailure {
                trace: Some(trace),
                ..failure(1, &long)
            },
        )
        .await
        .unwrap();

        let rows = list(&pool, &FailureQuery::default()).await.unwrap();
        assert_eq!(rows[0].id, id);
        assert_eq!(rows[0].message.chars().count(), MAX_MESSAGE_CHARS);
        assert_eq!(rows[0].trace.as_ref().unwrap().chars().count(), MAX_TRACE_CHARS);
        assert_eq!(rows[0].attempts, 3);
    }

    #[tokio::test]
    async fn test_resolve_for_source() {
        let pool = init_memory_database().await.unwrap();
        record(&pool, &failure(1, "a")).await.unwrap();
        record(&pool, &failure(1, "b")).await.unwrap();
        record(&pool, &failure(2, "c")).await.unwrap();
        assert_eq!(count_unresolved(&pool).await.unwrap(), 3);

        assert_eq!(resolve_for_source(&pool, 1, Utc::now()).await.unwrap(), 2);
        assert_eq!(count_unresolved(&pool).await.unwrap(), 1);
        // Already resolved rows are not touched again
        assert_eq!(resolve_for_source(&pool, 1, Utc::now()).await.unwrap(), 0);

        let resolved = list(
            &pool,
            &FailureQuery {
                source_id: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved.iter().all(|f| f.resolved && f.resolved_at.is_some()));
    }

    #[tokio::test]
    async fn test_list_filters_and_limit() {
        let pool = init_memory_database().await.unwrap();
        for i in 0..5 {
            record(&pool, &failure(i, "m")).await.unwrap();
        }
        resolve_for_source(&pool, 0, Utc::now()).await.unwrap();

        let unresolved = list(
            &pool,
            &FailureQuery {
                unresolved: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(unresolved.len(), 4);
        assert_eq!(unresolved[0].source_id, Some(4));

        let limited = list(
            &pool,
            &FailureQuery {
                limit: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(limited.len(), 2);
    }
}
