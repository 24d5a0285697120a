//! Run metrics repository
//!
//! One row per completed run, written once.

use chrono::{DateTime, Utc};
use docket_common::db::RunMetrics;
use docket_common::time::{from_db_timestamp, to_db_timestamp};
use docket_common::Result;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

const SELECT_COLUMNS: &str = r#"
    SELECT run_id, started_at, finished_at, duration_ms, created, updated,
           skipped_unchanged, skipped_ineligible, skipped_duplicate, skipped_circuit_open,
           failed, hearing_updates, breaker_tripped
    FROM run_metrics
"#;

/// Totals over a window of runs, used by the daily summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub runs: i64,
    pub created: i64,
    pub updated: i64,
    pub skipped_unchanged: i64,
    pub skipped_ineligible: i64,
    pub skipped_duplicate: i64,
    pub skipped_circuit_open: i64,
    pub failed: i64,
    pub hearing_updates: i64,
    pub breaker_trips: i64,
}

fn from_row(row: &SqliteRow) -> Result<RunMetrics> {
    let started_at: String = row.get("started_at");
    let finished_at: String = row.get("finished_at");
    Ok(RunMetrics {
        run_id: row.get("run_id"),
        started_at: from_db_timestamp(&started_at)?,
        finished_at: from_db_timestamp(&finished_at)?,
        duration_ms: row.get("duration_ms"),
        created: row.get("created"),
        updated: row.get("updated"),
        skipped_unchanged: row.get("skipped_unchanged"),
        skipped_ineligible: row.get("skipped_ineligible"),
        skipped_duplicate: row.get("skipped_duplicate"),
        skipped_circuit_open: row.get("skipped_circuit_open"),
        failed: row.get("failed"),
        hearing_updates: row.get("hearing_updates"),
        breaker_tripped: row.get::<i64, _>("breaker_tripped") != 0,
    })
}

pub async fn insert_run_metrics(pool: &SqlitePool, metrics: &RunMetrics) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO run_metrics (
            run_id, started_at, finished_at, duration_ms, created, updated,
            skipped_unchanged, skipped_ineligible, skipped_duplicate, skipped_circuit_open,
            failed, hearing_updates, breaker_tripped
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&metrics.run_id)
    .bind(to_db_timestamp(metrics.started_at))
    .bind(to_db_timestamp(metrics.finished_at))
    .bind(metrics.duration_ms)
    .bind(metrics.created)
    .bind(metrics.updated)
    .bind(metrics.skipped_unchanged)
    .bind(metrics.skipped_ineligible)
    .bind(metrics.skipped_duplicate)
    .bind(metrics.skipped_circuit_open)
    .bind(metrics.failed)
    .bind(metrics.hearing_updates)
    .bind(metrics.breaker_tripped as i64)
    .execute(pool)
    .await?;

    Ok(())
}

/// Most recently finished run
pub async fn latest(pool: &SqlitePool) -> Result<Option<RunMetrics>> {
    let row = sqlx::query(&format!("{} ORDER BY finished_at DESC LIMIT 1", SELECT_COLUMNS))
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(from_row).transpose()
}

/// Newest first
pub async fn list_recent(pool: &SqlitePool, limit: u32) -> Result<Vec<RunMetrics>> {
    let rows = sqlx::query(&format!("{} ORDER BY finished_at DESC LIMIT ?", SELECT_COLUMNS))
        .bind(limit as i64)
        .fetch_all(pool)
        .await?;
    rows.iter().map(from_row).collect()
}

/// Totals of every run finished at or after `since`
pub async fn aggregate_since(pool: &SqlitePool, since: DateTime<Utc>) -> Result<MetricsSummary> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS runs,
               COALESCE(SUM(created), 0) AS created,
               COALESCE(SUM(updated), 0) AS updated,
               COALESCE(SUM(skipped_unchanged), 0) AS skipped_unchanged,
               COALESCE(SUM(skipped_ineligible), 0) AS skipped_ineligible,
               COALESCE(SUM(skipped_duplicate), 0) AS skipped_duplicate,
               COALESCE(SUM(skipped_circuit_open), 0) AS skipped_circuit_open,
               COALESCE(SUM(failed), 0) AS failed,
               COALESCE(SUM(hearing_updates), 0) AS hearing_updates,
               COALESCE(SUM(breaker_tripped), 0) AS breaker_trips
        FROM run_metrics
        WHERE finished_at >= ?
        "#,
    )
    .bind(to_db_timestamp(since))
    .fetch_one(pool)
    .await?;

    Ok(MetricsSummary {
        runs: row.get("runs"),
        created: row.get("created"),
        updated: row.get("updated"),
        skipped_unchanged: row.get("skipped_unchanged"),
        skipped_ineligible: row.get("skipped_ineligible"),
        skipped_duplicate: row.get("skipped_duplicate"),
        skipped_circuit_open: row.get("skipped_circuit_open"),
        failed: row.get("failed"),
        hearing_updates: row.get("hearing_updates"),
        breaker_trips: row.get("breaker_trips"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use docket_common::db::init_memory_database;

    fn metrics(run_id: &str, finished_at: DateTime<Utc>, created: i64) -> RunMetrics {
        RunMetrics {
            run_id: run_id.to_string(),
            started_at: finished_at - Duration::seconds(5),
            finished_at,
            duration_ms: 5000,
            created,
            updated: 1,
            failed: 1,
            breaker_tripped: created == 0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_latest_and_recent() {
        let pool = init_memory_database().await.unwrap();
        assert!(latest(&pool).await.unwrap().is_none());

        let now = Utc::now();
        insert_run_metrics(&pool, &metrics("r1", now - Duration::hours(2), 1))
            .await
            .unwrap();
        insert_run_metrics(&pool, &metrics("r2", now, 2)).await.unwrap();

        assert_eq!(latest(&pool).await.unwrap().unwrap().run_id, "r2");
        let recent = list_recent(&pool, 10).await.unwrap();
        assert_eq!(
            recent.iter().map(|m| m.run_id.as_str()).collect::<Vec<_>>(),
            vec!["r2", "r1"]
        );
    }

    #[tokio::test]
    async fn test_run_metrics_written_once() {
        let pool = init_memory_database().await.unwrap();
        let m = metrics("r1", Utc::now(), 1);
        insert_run_metrics(&pool, &m).await.unwrap();
        assert!(insert_run_metrics(&pool, &m).await.is_err());
    }

    #[tokio::test]
    async fn test_aggregate_since_window() {
        let pool = init_memory_database().await.unwrap();
        let now = Utc::now();
        insert_run_metrics(&pool, &metrics("old", now - Duration::days(3), 9))
            .await
            .unwrap();
        insert_run_metrics(&pool, &metrics("a", now - Duration::hours(1), 2))
            .await
            .unwrap();
        insert_run_metrics(&pool, &metrics("b", now, 0)).await.unwrap();

        let summary = aggregate_since(&pool, now - Duration::days(1)).await.unwrap();
        assert_eq!(summary.runs, 2);
        assert_eq!(summary.created, 2);
        assert_eq!(summary.updated, 2);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.breaker_trips, 1);

        let empty = aggregate_since(&pool, now + Duration::days(1)).await.unwrap();
        assert_eq!(empty, MetricsSummary::default());
    }
}
