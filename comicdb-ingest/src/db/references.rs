//! Reference vocabulary operations (authors, artists, genres, work types)

use crate::models::RefKind;
use comicdb_common::Result;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

/// Find a reference row by exact name
pub async fn find_reference(pool: &SqlitePool, kind: RefKind, name: &str) -> Result<Option<Uuid>> {
    let sql = format!("SELECT guid FROM {} WHERE name = ?", kind.table());
    let guid: Option<String> = sqlx::query_scalar(&sql)
        .bind(name)
        .fetch_optional(pool)
        .await?;

    guid.map(|g| parse_guid(&g)).transpose()
}

/// Insert a reference row, returning the id of the row holding `name`
///
/// A concurrent insert of the same name is absorbed by `ON CONFLICT`; the
/// existing row's id is returned.
pub async fn insert_reference(pool: &SqlitePool, kind: RefKind, name: &str) -> Result<Uuid> {
    let guid = Uuid::new_v4();
    let sql = format!(
        r#"
        INSERT INTO {} (guid, name, created_at, updated_at)
        VALUES (?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
        ON CONFLICT(name) DO NOTHING
        "#,
        kind.table()
    );
    sqlx::query(&sql)
        .bind(guid.to_string())
        .bind(name)
        .execute(pool)
        .await?;

    find_reference(pool, kind, name)
        .await?
        .ok_or_else(|| comicdb_common::Error::Internal(format!("{} '{}' vanished after insert", kind, name)))
}

/// Every row of one reference table as (name, id)
pub async fn load_references(pool: &SqlitePool, kind: RefKind) -> Result<Vec<(String, Uuid)>> {
    let sql = format!("SELECT guid, name FROM {} ORDER BY name", kind.table());
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    rows.iter()
        .map(|row| {
            let guid: String = row.get("guid");
            Ok((row.get("name"), parse_guid(&guid)?))
        })
        .collect()
}

/// Row count of one reference table
pub async fn count_references(pool: &SqlitePool, kind: RefKind) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", kind.table());
    Ok(sqlx::query_scalar(&sql).fetch_one(pool).await?)
}

pub(crate) fn parse_guid(guid: &str) -> Result<Uuid> {
    Uuid::parse_str(guid)
        .map_err(|e| comicdb_common::Error::Internal(format!("Invalid guid '{}': {}", guid, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use comicdb_common::db::init_memory_database;

    #[tokio::test]
    async fn test_insert_then_find_reference() {
        let pool = init_memory_database().await.unwrap();

        let id = insert_reference(&pool, RefKind::Genre, "Action").await.unwrap();
        let found = find_reference(&pool, RefKind::Genre, "Action").await.unwrap();

        assert_eq!(found, Some(id));
        assert_eq!(find_reference(&pool, RefKind::Genre, "action").await.unwrap(), None);
        assert_eq!(find_reference(&pool, RefKind::Author, "Action").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_insert_existing_name_returns_existing_id() {
        let pool = init_memory_database().await.unwrap();

        let first = insert_reference(&pool, RefKind::Author, "Oda").await.unwrap();
        let second = insert_reference(&pool, RefKind::Author, "Oda").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(count_references(&pool, RefKind::Author).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_load_references_sorted_by_name() {
        let pool = init_memory_database().await.unwrap();
        insert_reference(&pool, RefKind::WorkType, "Manhwa").await.unwrap();
        insert_reference(&pool, RefKind::WorkType, "Manga").await.unwrap();

        let names: Vec<String> = load_references(&pool, RefKind::WorkType)
            .await
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();

        assert_eq!(names, vec!["Manga", "Manhwa"]);
    }
}
