//! Work database operations
//!
//! Works are keyed by slug. An upsert updates every mutable column and
//! synchronizes genre links inside one transaction.

use super::references::parse_guid;
use super::UpsertOutcome;
use crate::config::ChildSyncMode;
use comicdb_common::Result;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

/// Reference-resolved work ready to write
#[derive(Debug, Clone, PartialEq)]
pub struct WorkRow {
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub author_id: Uuid,
    pub artist_id: Uuid,
    pub type_id: Uuid,
    /// Path relative to the image root (or the placeholder)
    pub cover_path: Option<String>,
    pub source_url: Option<String>,
    pub release_year: Option<i64>,
    pub rating: Option<f64>,
    pub genre_ids: Vec<Uuid>,
}

/// Work fields the resolution engine indexes
#[derive(Debug, Clone, PartialEq)]
pub struct WorkSummary {
    pub guid: Uuid,
    pub slug: String,
    pub title: String,
}

/// Insert or update a work by slug
pub async fn upsert_work(pool: &SqlitePool, work: &WorkRow, mode: ChildSyncMode) -> Result<UpsertOutcome> {
    let mut tx = pool.begin().await?;

    let existing: Option<String> = sqlx::query_scalar("SELECT guid FROM works WHERE slug = ?")
        .bind(&work.slug)
        .fetch_optional(&mut *tx)
        .await?;

    let outcome = match existing {
        Some(guid) => {
            let guid = parse_guid(&guid)?;
            sqlx::query(
                r#"
                UPDATE works SET
                    title = ?,
                    description = ?,
                    status = ?,
                    author_id = ?,
                    artist_id = ?,
                    type_id = ?,
                    cover_path = ?,
                    source_url = ?,
                    release_year = ?,
                    rating = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE guid = ?
                "#,
            )
            .bind(&work.title)
            .bind(&work.description)
            .bind(&work.status)
            .bind(work.author_id.to_string())
            .bind(work.artist_id.to_string())
            .bind(work.type_id.to_string())
            .bind(&work.cover_path)
            .bind(&work.source_url)
            .bind(work.release_year)
            .bind(work.rating)
            .bind(guid.to_string())
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Updated(guid)
        }
        None => {
            let guid = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO works (
                    guid, slug, title, description, status, author_id, artist_id, type_id,
                    cover_path, source_url, release_year, rating, created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
                "#,
            )
            .bind(guid.to_string())
            .bind(&work.slug)
            .bind(&work.title)
            .bind(&work.description)
            .bind(&work.status)
            .bind(work.author_id.to_string())
            .bind(work.artist_id.to_string())
            .bind(work.type_id.to_string())
            .bind(&work.cover_path)
            .bind(&work.source_url)
            .bind(work.release_year)
            .bind(work.rating)
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Created(guid)
        }
    };

    sync_genres(&mut tx, outcome.id(), &work.genre_ids, mode).await?;
    tx.commit().await?;

    Ok(outcome)
}

async fn sync_genres(
    tx: &mut Transaction<'_, Sqlite>,
    work_id: Uuid,
    genre_ids: &[Uuid],
    mode: ChildSyncMode,
) -> Result<()> {
    if mode == ChildSyncMode::Replace {
        sqlx::query("DELETE FROM work_genres WHERE work_id = ?")
            .bind(work_id.to_string())
            .execute(&mut **tx)
            .await?;
    }

    for genre_id in genre_ids {
        sqlx::query(
            r#"
            INSERT INTO work_genres (work_id, genre_id, created_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(work_id, genre_id) DO NOTHING
            "#,
        )
        .bind(work_id.to_string())
        .bind(genre_id.to_string())
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Work id by exact slug
pub async fn find_work_by_slug(pool: &SqlitePool, slug: &str) -> Result<Option<Uuid>> {
    let guid: Option<String> = sqlx::query_scalar("SELECT guid FROM works WHERE slug = ?")
        .bind(slug)
        .fetch_optional(pool)
        .await?;

    guid.map(|g| parse_guid(&g)).transpose()
}

pub async fn work_exists(pool: &SqlitePool, guid: Uuid) -> Result<bool> {
    let found: Option<i64> = sqlx::query_scalar("SELECT 1 FROM works WHERE guid = ?")
        .bind(guid.to_string())
        .fetch_optional(pool)
        .await?;

    Ok(found.is_some())
}

/// Every work in slug order
pub async fn load_work_summaries(pool: &SqlitePool) -> Result<Vec<WorkSummary>> {
    let rows = sqlx::query("SELECT guid, slug, title FROM works ORDER BY slug")
        .fetch_all(pool)
        .await?;

    rows.iter()
        .map(|row| {
            let guid: String = row.get("guid");
            Ok(WorkSummary {
                guid: parse_guid(&guid)?,
                slug: row.get("slug"),
                title: row.get("title"),
            })
        })
        .collect()
}

/// Genre ids linked to a work, in insertion order
pub async fn load_work_genres(pool: &SqlitePool, work_id: Uuid) -> Result<Vec<Uuid>> {
    let guids: Vec<String> =
        sqlx::query_scalar("SELECT genre_id FROM work_genres WHERE work_id = ? ORDER BY rowid")
            .bind(work_id.to_string())
            .fetch_all(pool)
            .await?;

    guids.iter().map(|g| parse_guid(g)).collect()
}

pub async fn count_works(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM works").fetch_one(pool).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::references::insert_reference;
    use crate::models::RefKind;
    use comicdb_common::db::init_memory_database;

    async fn sample_row(pool: &SqlitePool, slug: &str) -> WorkRow {
        WorkRow {
            slug: slug.to_string(),
            title: "One Piece".to_string(),
            description: None,
            status: Some("ongoing".to_string()),
            author_id: insert_reference(pool, RefKind::Author, "Oda").await.unwrap(),
            artist_id: insert_reference(pool, RefKind::Artist, "Oda").await.unwrap(),
            type_id: insert_reference(pool, RefKind::WorkType, "Manga").await.unwrap(),
            cover_path: Some("covers/one-piece/cover.jpg".to_string()),
            source_url: None,
            release_year: Some(1997),
            rating: Some(9.1),
            genre_ids: vec![
                insert_reference(pool, RefKind::Genre, "Action").await.unwrap(),
                insert_reference(pool, RefKind::Genre, "Adventure").await.unwrap(),
            ],
        }
    }

    #[tokio::test]
    async fn test_upsert_creates_then_updates() {
        let pool = init_memory_database().await.unwrap();
        let mut row = sample_row(&pool, "one-piece").await;

        let first = upsert_work(&pool, &row, ChildSyncMode::Replace).await.unwrap();
        assert!(matches!(first, UpsertOutcome::Created(_)));

        row.title = "ONE PIECE".to_string();
        let second = upsert_work(&pool, &row, ChildSyncMode::Replace).await.unwrap();
        assert_eq!(second, UpsertOutcome::Updated(first.id()));

        let title: String = sqlx::query_scalar("SELECT title FROM works WHERE slug = 'one-piece'")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(title, "ONE PIECE");
        assert_eq!(count_works(&pool).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_genre_replace_vs_merge() {
        let pool = init_memory_database().await.unwrap();
        let mut row = sample_row(&pool, "one-piece").await;
        let id = upsert_work(&pool, &row, ChildSyncMode::Replace).await.unwrap().id();

        let comedy = insert_reference(&pool, RefKind::Genre, "Comedy").await.unwrap();
        let action = row.genre_ids[0];

        row.genre_ids = vec![comedy];
        upsert_work(&pool, &row, ChildSyncMode::Merge).await.unwrap();
        assert_eq!(load_work_genres(&pool, id).await.unwrap().len(), 3);

        row.genre_ids = vec![action];
        upsert_work(&pool, &row, ChildSyncMode::Replace).await.unwrap();
        assert_eq!(load_work_genres(&pool, id).await.unwrap(), vec![action]);
    }

    #[tokio::test]
    async fn test_unknown_author_violates_foreign_key() {
        let pool = init_memory_database().await.unwrap();
        let mut row = sample_row(&pool, "naruto").await;
        row.author_id = Uuid::new_v4();

        let err = upsert_work(&pool, &row, ChildSyncMode::Replace).await.unwrap_err();
        let classified = crate::error::PersistError::from(err);

        assert!(matches!(classified, crate::error::PersistError::Constraint { .. }));
        assert_eq!(count_works(&pool).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_summaries_in_slug_order() {
        let pool = init_memory_database().await.unwrap();
        let naruto = sample_row(&pool, "naruto").await;
        let one_piece = sample_row(&pool, "one-piece").await;
        upsert_work(&pool, &one_piece, ChildSyncMode::Replace).await.unwrap();
        upsert_work(&pool, &naruto, ChildSyncMode::Replace).await.unwrap();

        let summaries = load_work_summaries(&pool).await.unwrap();
        let slugs: Vec<&str> = summaries.iter().map(|w| w.slug.as_str()).collect();

        assert_eq!(slugs, vec!["naruto", "one-piece"]);
        assert_eq!(summaries[1].title, "One Piece");
        assert!(find_work_by_slug(&pool, "naruto").await.unwrap().is_some());
    }
}
