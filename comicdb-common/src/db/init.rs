//! Canonical store initialization
//!
//! Creates the canonical tables on first run. Every statement is
//! `IF NOT EXISTS`, so calling [`init_database`] on an existing store is a
//! no-op apart from connection setup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Current canonical schema version
pub const SCHEMA_VERSION: i64 = 1;

/// Busy timeout applied to every connection
const BUSY_TIMEOUT_MS: u64 = 250;

/// Reference vocabulary tables (low-cardinality, name-keyed)
pub const REFERENCE_TABLES: [&str; 4] = ["authors", "artists", "genres", "work_types"];

/// Open (creating if needed) the canonical store and ensure the schema exists
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(BUSY_TIMEOUT_MS));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;

    Ok(pool)
}

/// In-memory store with the full schema (single connection so every query
/// sees the same database)
pub async fn init_memory_database() -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .in_memory(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every canonical table (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_schema_version_table(pool).await?;

    for table in REFERENCE_TABLES {
        create_reference_table(pool, table).await?;
    }

    create_works_table(pool).await?;
    create_work_genres_table(pool).await?;
    create_chapters_table(pool).await?;
    create_chapter_images_table(pool).await?;

    sqlx::query("INSERT OR IGNORE INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_schema_version_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create one name-keyed reference table (authors, artists, genres, work_types)
async fn create_reference_table(pool: &SqlitePool, table: &str) -> Result<()> {
    let sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            guid TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CONSTRAINT uq_{table}_name UNIQUE (name)
        )
        "#
    );
    sqlx::query(&sql).execute(pool).await?;

    Ok(())
}

/// Create the works table
///
/// One row per canonical comic series, keyed by slug.
pub async fn create_works_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS works (
            guid TEXT PRIMARY KEY,
            slug TEXT NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            status TEXT,
            author_id TEXT NOT NULL CONSTRAINT fk_works_author REFERENCES authors(guid),
            artist_id TEXT NOT NULL CONSTRAINT fk_works_artist REFERENCES artists(guid),
            type_id TEXT NOT NULL CONSTRAINT fk_works_type REFERENCES work_types(guid),
            cover_path TEXT,
            source_url TEXT,
            release_year INTEGER,
            rating REAL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CONSTRAINT uq_works_slug UNIQUE (slug),
            CHECK (rating IS NULL OR (rating >= 0.0 AND rating <= 10.0))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_works_title ON works(title)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the work_genres link table (set semantics via composite key)
async fn create_work_genres_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS work_genres (
            work_id TEXT NOT NULL CONSTRAINT fk_work_genres_work REFERENCES works(guid) ON DELETE CASCADE,
            genre_id TEXT NOT NULL CONSTRAINT fk_work_genres_genre REFERENCES genres(guid) ON DELETE CASCADE,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (work_id, genre_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_work_genres_genre ON work_genres(genre_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the chapters table
///
/// Natural key is (work_id, number); work_id can never be NULL.
pub async fn create_chapters_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chapters (
            guid TEXT PRIMARY KEY,
            work_id TEXT NOT NULL CONSTRAINT fk_chapters_work REFERENCES works(guid) ON DELETE CASCADE,
            number REAL NOT NULL,
            title TEXT,
            slug TEXT,
            source_url TEXT,
            published_at TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            CONSTRAINT uq_chapters_work_number UNIQUE (work_id, number),
            CHECK (number >= 0.0)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_chapters_work ON chapters(work_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the chapter_images table (ordered page list)
async fn create_chapter_images_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chapter_images (
            chapter_id TEXT NOT NULL CONSTRAINT fk_chapter_images_chapter REFERENCES chapters(guid) ON DELETE CASCADE,
            page INTEGER NOT NULL,
            file_path TEXT,
            source_url TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (chapter_id, page),
            CHECK (page >= 1)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
