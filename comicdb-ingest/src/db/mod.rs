//! Canonical store access for comicdb-ingest
//!
//! Schema creation lives in `comicdb_common::db`; this module holds the
//! pipeline's reads and idempotent writes.

pub mod chapters;
pub mod references;
pub mod works;

use crate::error::IngestError;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use uuid::Uuid;

/// Whether an upsert inserted a new row or updated an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(Uuid),
    Updated(Uuid),
}

impl UpsertOutcome {
    pub fn id(&self) -> Uuid {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Updated(id) => *id,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

/// Open the canonical store; failure aborts the run
pub async fn open_store(db_path: &Path) -> Result<SqlitePool, IngestError> {
    tracing::debug!(path = %db_path.display(), "Opening canonical store");

    comicdb_common::db::init_database(db_path)
        .await
        .map_err(|e| IngestError::StoreUnavailable(format!("{}: {}", db_path.display(), e)))
}

/// Open the store for a dry run without creating or modifying anything
///
/// An existing store is opened read-only; a missing one is stood in for by
/// an empty in-memory store so resolution still runs.
pub async fn open_store_read_only(db_path: &Path) -> Result<SqlitePool, IngestError> {
    let unavailable = |e: String| IngestError::StoreUnavailable(format!("{}: {}", db_path.display(), e));

    if !db_path.exists() {
        tracing::info!(path = %db_path.display(), "Store does not exist yet; dry run uses an empty store");
        return comicdb_common::db::init_memory_database()
            .await
            .map_err(|e| unavailable(e.to_string()));
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .read_only(true)
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .map_err(|e| unavailable(e.to_string()))
}
