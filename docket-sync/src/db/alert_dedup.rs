//! Alert dedup state repository

use chrono::{DateTime, Utc};
use docket_common::db::AlertDedupRecord;
use docket_common::time::{from_db_timestamp, to_db_timestamp};
use docket_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use super::parse_optional_timestamp;

const SELECT_COLUMNS: &str = r#"
    SELECT fingerprint, exception_type, source_component, sample_message,
           first_seen_at, last_seen_at, occurrence_count, last_sent_at, suppressed_since_send
    FROM alert_dedup
"#;

fn from_row(row: &SqliteRow) -> Result<AlertDedupRecord> {
    let first_seen_at: String = row.get("first_seen_at");
    let last_seen_at: String = row.get("last_seen_at");
    Ok(AlertDedupRecord {
        fingerprint: row.get("fingerprint"),
        exception_type: row.get("exception_type"),
        source_component: row.get("source_component"),
        sample_message: row.get("sample_message"),
        first_seen_at: from_db_timestamp(&first_seen_at)?,
        last_seen_at: from_db_timestamp(&last_seen_at)?,
        occurrence_count: row.get("occurrence_count"),
        last_sent_at: parse_optional_timestamp(row.get("last_sent_at"))?,
        suppressed_since_send: row.get("suppressed_since_send"),
    })
}

pub async fn get(pool: &SqlitePool, fingerprint: &str) -> Result<Option<AlertDedupRecord>> {
    let row = sqlx::query(&format!("{} WHERE fingerprint = ?", SELECT_COLUMNS))
        .bind(fingerprint)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// Count one occurrence. `suppressed` also bumps the suppressed-since-send counter.
pub async fn record_occurrence(
    pool: &SqlitePool,
    fingerprint: &str,
    exception_type: &str,
    source_component: &str,
    sample_message: &str,
    suppressed: bool,
    now: DateTime<Utc>,
) -> Result<()> {
    let now_str = to_db_timestamp(now);
    sqlx::query(
        r#"
        INSERT INTO alert_dedup (
            fingerprint, exception_type, source_component, sample_message,
            first_seen_at, last_seen_at, occurrence_count, suppressed_since_send
        ) VALUES (?, ?, ?, ?, ?, ?, 1, ?)
        ON CONFLICT(fingerprint) DO UPDATE SET
            last_seen_at = excluded.last_seen_at,
            occurrence_count = occurrence_count + 1,
            suppressed_since_send = suppressed_since_send + excluded.suppressed_since_send
        "#,
    )
    .bind(fingerprint)
    .bind(exception_type)
    .bind(source_component)
    .bind(sample_message)
    .bind(&now_str)
    .bind(&now_str)
    .bind(suppressed as i64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Record a delivered alert and reset the suppressed counter
pub async fn mark_sent(pool: &SqlitePool, fingerprint: &str, now: DateTime<Utc>) -> Result<()> {
    sqlx::query(
        "UPDATE alert_dedup SET last_sent_at = ?, suppressed_since_send = 0 WHERE fingerprint = ?",
    )
    .bind(to_db_timestamp(now))
    .bind(fingerprint)
    .execute(pool)
    .await?;
    Ok(())
}

/// Fingerprints with suppressed occurrences seen at or after `since`
pub async fn list_suppressed(
    pool: &SqlitePool,
    since: DateTime<Utc>,
) -> Result<Vec<AlertDedupRecord>> {
    let rows = sqlx::query(&format!(
        "{} WHERE suppressed_since_send > 0 AND last_seen_at >= ? ORDER BY suppressed_since_send DESC",
        SELECT_COLUMNS
    ))
    .bind(to_db_timestamp(since))
    .fetch_all(pool)
    .await?;
    rows.iter().map(from_row).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use docket_common::db::init_memory_database;

    async fn occur(pool: &SqlitePool, suppressed: bool, now: DateTime<Utc>) {
        record_occurrence(pool, "fp", "BoardError::Network", "docket-sync", "reset", suppressed, now)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_occurrences_accumulate() {
        let pool = init_memory_database().await.unwrap();
        let now = Utc::now();
        assert!(get(&pool, "fp").await.unwrap().is_none());

        occur(&pool, false, now).await;
        occur(&pool, true, now + Duration::minutes(1)).await;
        occur(&pool, true, now + Duration::minutes(2)).await;

        let record = get(&pool, "fp").await.unwrap().unwrap();
        assert_eq!(record.occurrence_count, 3);
        assert_eq!(record.suppressed_since_send, 2);
        assert!(record.last_seen_at > record.first_seen_at);
        assert!(record.last_sent_at.is_none());
    }

    #[tokio::test]
    async fn test_mark_sent_resets_suppressed() {
        let pool = init_memory_database().await.unwrap();
        let now = Utc::now();
        occur(&pool, true, now).await;
        mark_sent(&pool, "fp", now).await.unwrap();

        let record = get(&pool, "fp").await.unwrap().unwrap();
        assert_eq!(record.suppressed_since_send, 0);
        assert!(record.last_sent_at.is_some());
    }

    #[tokio::test]
    async fn test_list_suppressed_window() {
        let pool = init_memory_database().await.unwrap();
        let now = Utc::now();
        occur(&pool, true, now - Duration::days(2)).await;

        assert!(list_suppressed(&pool, now - Duration::days(1)).await.unwrap().is_empty());
        assert_eq!(list_suppressed(&pool, now - Duration::days(3)).await.unwrap().len(), 1);
    }
}
