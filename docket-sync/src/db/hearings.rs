//! Hearing snapshot repository

use docket_common::db::HearingSnapshot;
use docket_common::time::{from_db_timestamp, to_db_timestamp};
use docket_common::Result;
use sqlx::{Row, SqlitePool};

use super::{parse_local_timestamp, LOCAL_TIMESTAMP_FORMAT};

pub async fn get_snapshot(
    pool: &SqlitePool,
    source_id: i64,
    board_id: &str,
) -> Result<Option<HearingSnapshot>> {
    let row = sqlx::query(
        r#"
        SELECT source_id, board_id, starts_at, status, judge, city, updated_at
        FROM hearing_snapshots
        WHERE source_id = ? AND board_id = ?
        "#,
    )
    .bind(source_id)
    .bind(board_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let starts_at: String = row.get("starts_at");
    let updated_at: String = row.get("updated_at");

    Ok(Some(HearingSnapshot {
        source_id: row.get("source_id"),
        board_id: row.get("board_id"),
        starts_at: parse_local_timestamp(&starts_at)?,
        status: row.get("status"),
        judge: row.get("judge"),
        city: row.get("city"),
        updated_at: from_db_timestamp(&updated_at)?,
    }))
}

/// Insert or overwrite the snapshot for (source id, board id)
pub async fn upsert_snapshot(pool: &SqlitePool, snapshot: &HearingSnapshot) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO hearing_snapshots (source_id, board_id, starts_at, status, judge, city, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(source_id, board_id) DO UPDATE SET
            starts_at = excluded.starts_at,
            status = excluded.status,
            judge = excluded.judge,
            city = excluded.city,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(snapshot.source_id)
    .bind(&snapshot.board_id)
    .bind(snapshot.starts_at.format(LOCAL_TIMESTAMP_FORMAT).to_string())
    .bind(snapshot.status)
    .bind(&snapshot.judge)
    .bind(&snapshot.city)
    .bind(to_db_timestamp(snapshot.updated_at))
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use docket_common::db::init_memory_database;

    fn snapshot(status: i32) -> HearingSnapshot {
        HearingSnapshot {
            source_id: 7,
            board_id: "board-1".to_string(),
            starts_at: NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            status,
            judge: Some("Dayan".to_string()),
            city: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_upsert_then_overwrite() {
        let pool = init_memory_database().await.unwrap();
        assert!(get_snapshot(&pool, 7, "board-1").await.unwrap().is_none());

        upsert_snapshot(&pool, &snapshot(0)).await.unwrap();
        let first = get_snapshot(&pool, 7, "board-1").await.unwrap().unwrap();
        assert_eq!(first.status, 0);
        assert_eq!(first.starts_at, snapshot(0).starts_at);

        upsert_snapshot(&pool, &snapshot(2)).await.unwrap();
        let second = get_snapshot(&pool, 7, "board-1").await.unwrap().unwrap();
        assert_eq!(second.status, 2);

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM hearing_snapshots")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_snapshot_keyed_by_board() {
        let pool = init_memory_database().await.unwrap();
        upsert_snapshot(&pool, &snapshot(0)).await.unwrap();
        assert!(get_snapshot(&pool, 7, "board-2").await.unwrap().is_none());
    }
}
