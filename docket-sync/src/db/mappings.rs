//! Case mapping repository
//!
//! A mapping is inserted exactly once per source id and never deleted. The
//! primary key on `source_id` rejects a second insert.

use chrono::{DateTime, Utc};
use docket_common::db::MappingRecord;
use docket_common::time::{from_db_timestamp, to_db_timestamp};
use docket_common::{Error, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use super::{parse_date, parse_optional_timestamp, DATE_FORMAT};

const SELECT_COLUMNS: &str = r#"
    SELECT source_id, case_number, item_id, board_id, item_name, source_created_on,
           created_at, last_synced_to_board_at, last_synced_from_board_at,
           content_version, hearing_checksum
    FROM case_mappings
"#;

fn from_row(row: &SqliteRow) -> Result<MappingRecord> {
    let source_created_on: Option<String> = row.get("source_created_on");
    let created_at: String = row.get("created_at");

    Ok(MappingRecord {
        source_id: row.get("source_id"),
        case_number: row.get("case_number"),
        item_id: row.get("item_id"),
        board_id: row.get("board_id"),
        item_name: row.get("item_name"),
        source_created_on: source_created_on.as_deref().map(parse_date).transpose()?,
        created_at: from_db_timestamp(&created_at)?,
        last_synced_to_board_at: parse_optional_timestamp(row.get("last_synced_to_board_at"))?,
        last_synced_from_board_at: parse_optional_timestamp(
            row.get("last_synced_from_board_at"),
        )?,
        content_version: row.get("content_version"),
        hearing_checksum: row.get("hearing_checksum"),
    })
}

/// Insert a new mapping. Fails with `AlreadyMapped` if the source id is already mapped.
pub async fn insert(pool: &SqlitePool, mapping: &MappingRecord) -> Result<()> {
    let result = sqlx::query(
        r#"
        INSERT INTO case_mappings (
            source_id, case_number, item_id, board_id, item_name, source_created_on,
            created_at, last_synced_to_board_at, last_synced_from_board_at,
            content_version, hearing_checksum
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(mapping.source_id)
    .bind(&mapping.case_number)
    .bind(&mapping.item_id)
    .bind(&mapping.board_id)
    .bind(&mapping.item_name)
    .bind(
        mapping
            .source_created_on
            .map(|d| d.format(DATE_FORMAT).to_string()),
    )
    .bind(to_db_timestamp(mapping.created_at))
    .bind(mapping.last_synced_to_board_at.map(to_db_timestamp))
    .bind(mapping.last_synced_from_board_at.map(to_db_timestamp))
    .bind(&mapping.content_version)
    .bind(&mapping.hearing_checksum)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(Error::AlreadyMapped(mapping.source_id))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn get(pool: &SqlitePool, source_id: i64) -> Result<Option<MappingRecord>> {
    let row = sqlx::query(&format!("{} WHERE source_id = ?", SELECT_COLUMNS))
        .bind(source_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(from_row).transpose()
}

/// Every mapping on `board_id`, ordered by source id
pub async fn list_for_board(pool: &SqlitePool, board_id: &str) -> Result<Vec<MappingRecord>> {
    let rows = sqlx::query(&format!(
        "{} WHERE board_id = ? ORDER BY source_id",
        SELECT_COLUMNS
    ))
    .bind(board_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(from_row).collect()
}

/// Mapped source ids on `board_id`
pub async fn list_source_ids(pool: &SqlitePool, board_id: &str) -> Result<HashSet<i64>> {
    let ids: Vec<i64> = sqlx::query_scalar("SELECT source_id FROM case_mappings WHERE board_id = ?")
        .bind(board_id)
        .fetch_all(pool)
        .await?;

    Ok(ids.into_iter().collect())
}

/// Store a new content version after a successful board write
pub async fn update_version(
    pool: &SqlitePool,
    source_id: i64,
    content_version: &str,
    synced_at: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE case_mappings
        SET content_version = ?, last_synced_to_board_at = ?
        WHERE source_id = ?
        "#,
    )
    .bind(content_version)
    .bind(to_db_timestamp(synced_at))
    .bind(source_id)
    .execute(pool)
    .await?;

    expect_one(result.rows_affected(), source_id)
}

pub async fn update_hearing_checksum(
    pool: &SqlitePool,
    source_id: i64,
    checksum: &str,
    synced_at: DateTime<Utc>,
) -> Result<()> {
    let result = sqlx::query(
        r#"
        UPDATE case_mappings
        SET hearing_checksum = ?, last_synced_to_board_at = ?
        WHERE source_id = ?
        "#,
    )
    .bind(checksum)
    .bind(to_db_timestamp(synced_at))
    .bind(source_id)
    .execute(pool)
    .await?;

    expect_one(result.rows_affected(), source_id)
}

pub async fn update_item_name(pool: &SqlitePool, source_id: i64, item_name: &str) -> Result<()> {
    let result = sqlx::query("UPDATE case_mappings SET item_name = ? WHERE source_id = ?")
        .bind(item_name)
        .bind(source_id)
        .execute(pool)
        .await?;

    expect_one(result.rows_affected(), source_id)
}

fn expect_one(rows_affected: u64, source_id: i64) -> Result<()> {
    if rows_affected == 0 {
        return Err(Error::MappingNotFound(source_id));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use docket_common::db::init_memory_database;

    fn mapping(source_id: i64) -> MappingRecord {
        MappingRecord {
            source_id,
            case_number: format!("2024-{:04}", source_id),
            item_id: format!("item-{}", source_id),
            board_id: "board-1".to_string(),
            item_name: Some(format!("2024-{:04} - Title", source_id)),
            source_created_on: NaiveDate::from_ymd_opt(2024, 3, 1),
            created_at: Utc::now(),
            last_synced_to_board_at: None,
            last_synced_from_board_at: None,
            content_version: "a".repeat(64),
            hearing_checksum: None,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let pool = init_memory_database().await.unwrap();
        let original = mapping(1);
        insert(&pool, &original).await.unwrap();

        let loaded = get(&pool, 1).await.unwrap().unwrap();
        assert_eq!(loaded.item_id, "item-1");
        assert_eq!(loaded.source_created_on, original.source_created_on);
        assert_eq!(loaded.content_version, original.content_version);
        assert!(get(&pool, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_insert_rejected() {
        let pool = init_memory_database().await.unwrap();
        insert(&pool, &mapping(1)).await.unwrap();

        let again = MappingRecord {
            item_id: "other".to_string(),
            ..mapping(1)
        };
        assert!(matches!(
            insert(&pool, &again).await,
            Err(Error::AlreadyMapped(1))
        ));
        assert_eq!(get(&pool, 1).await.unwrap().unwrap().item_id, "item-1");
    }

    #[tokio::test]
    async fn test_list_source_ids_scoped_to_board() {
        let pool = init_memory_database().await.unwrap();
        insert(&pool, &mapping(1)).await.unwrap();
        insert(&pool, &mapping(2)).await.unwrap();
        insert(
            &pool,
            &MappingRecord {
                board_id: "board-2".to_string(),
                ..mapping(3)
            },
        )
        .await
        .unwrap();

        let ids = list_source_ids(&pool, "board-1").await.unwrap();
        assert_eq!(ids, [1, 2].into_iter().collect());
        assert_eq!(list_for_board(&pool, "board-2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_updates() {
        let pool = init_memory_database().await.unwrap();
        insert(&pool, &mapping(1)).await.unwrap();
        let now = Utc::now();

        update_version(&pool, 1, &"b".repeat(64), now).await.unwrap();
        update_hearing_checksum(&pool, 1, "hc", now).await.unwrap();
        update_item_name(&pool, 1, "renamed").await.unwrap();

        let loaded = get(&pool, 1).await.unwrap().unwrap();
        assert_eq!(loaded.content_version, "b".repeat(64));
        assert_eq!(loaded.hearing_checksum.as_deref(), Some("hc"));
        assert_eq!(loaded.item_name.as_deref(), Some("renamed"));
        assert!(loaded.last_synced_to_board_at.is_some());

        assert!(matches!(
            update_item_name(&pool, 99, "x").await,
            Err(Error::MappingNotFound(99))
        ));
    }
}
