//! Chapter database operations
//!
//! Chapters are keyed by (work_id, number). Page images keep source order
//! through the 1-based `page` column.

use super::references::parse_guid;
use super::UpsertOutcome;
use crate::config::ChildSyncMode;
use comicdb_common::Result;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use uuid::Uuid;

/// One page image; `file_path` is `None` when the download failed
#[derive(Debug, Clone, PartialEq)]
pub struct PageRow {
    pub source_url: String,
    pub file_path: Option<String>,
}

/// Parent-resolved chapter ready to write
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterRow {
    pub work_id: Uuid,
    pub number: f64,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub source_url: Option<String>,
    pub published_at: Option<String>,
    /// Pages in reading order
    pub pages: Vec<PageRow>,
}

/// Insert or update a chapter by (work_id, number)
pub async fn upsert_chapter(pool: &SqlitePool, chapter: &ChapterRow, mode: ChildSyncMode) -> Result<UpsertOutcome> {
    let mut tx = pool.begin().await?;

    let existing: Option<String> =
        sqlx::query_scalar("SELECT guid FROM chapters WHERE work_id = ? AND number = ?")
            .bind(chapter.work_id.to_string())
            .bind(chapter.number)
            .fetch_optional(&mut *tx)
            .await?;

    let outcome = match existing {
        Some(guid) => {
            let guid = parse_guid(&guid)?;
            sqlx::query(
                r#"
                UPDATE chapters SET
                    title = ?,
                    slug = ?,
                    source_url = ?,
                    published_at = ?,
                    updated_at = CURRENT_TIMESTAMP
                WHERE guid = ?
                "#,
            )
            .bind(&chapter.title)
            .bind(&chapter.slug)
            .bind(&chapter.source_url)
            .bind(&chapter.published_at)
            .bind(guid.to_string())
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Updated(guid)
        }
        None => {
            let guid = Uuid::new_v4();
            sqlx::query(
                r#"
                INSERT INTO chapters (
                    guid, work_id, number, title, slug, source_url, published_at,
                    created_at, updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)
                "#,
            )
            .bind(guid.to_string())
            .bind(chapter.work_id.to_string())
            .bind(chapter.number)
            .bind(&chapter.title)
            .bind(&chapter.slug)
            .bind(&chapter.source_url)
            .bind(&chapter.published_at)
            .execute(&mut *tx)
            .await?;
            UpsertOutcome::Created(guid)
        }
    };

    sync_pages(&mut tx, outcome.id(), &chapter.pages, mode).await?;
    tx.commit().await?;

    Ok(outcome)
}

async fn sync_pages(
    tx: &mut Transaction<'_, Sqlite>,
    chapter_id: Uuid,
    pages: &[PageRow],
    mode: ChildSyncMode,
) -> Result<()> {
    if mode == ChildSyncMode::Replace {
        sqlx::query("DELETE FROM chapter_images WHERE chapter_id = ?")
            .bind(chapter_id.to_string())
            .execute(&mut **tx)
            .await?;
    }

    for (index, page) in pages.iter().enumerate() {
        // Merge keeps an earlier local copy when this run's download failed
        sqlx::query(
            r#"
            INSERT INTO chapter_images (chapter_id, page, file_path, source_url, created_at)
            VALUES (?, ?, ?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(chapter_id, page) DO UPDATE SET
                file_path = COALESCE(excluded.file_path, chapter_images.file_path),
                source_url = excluded.source_url
            "#,
        )
        .bind(chapter_id.to_string())
        .bind(index as i64 + 1)
        .bind(&page.file_path)
        .bind(&page.source_url)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}

/// Chapter id by natural key
pub async fn find_chapter(pool: &SqlitePool, work_id: Uuid, number: f64) -> Result<Option<Uuid>> {
    let guid: Option<String> =
        sqlx::query_scalar("SELECT guid FROM chapters WHERE work_id = ? AND number = ?")
            .bind(work_id.to_string())
            .bind(number)
            .fetch_optional(pool)
            .await?;

    guid.map(|g| parse_guid(&g)).transpose()
}

/// Page rows of a chapter in page order
pub async fn load_pages(pool: &SqlitePool, chapter_id: Uuid) -> Result<Vec<PageRow>> {
    let rows = sqlx::query(
        "SELECT file_path, source_url FROM chapter_images WHERE chapter_id = ? ORDER BY page",
    )
    .bind(chapter_id.to_string())
    .fetch_all(pool)
    .await?;

    Ok(rows
        .iter()
        .map(|row| PageRow {
            source_url: row.get("source_url"),
            file_path: row.get("file_path"),
        })
        .collect())
}

pub async fn count_chapters(pool: &SqlitePool) -> Result<i64> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM chapters").fetch_one(pool).await?)
}
