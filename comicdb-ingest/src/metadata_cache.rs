//! Metadata resolution cache
//!
//! Get-or-create for author/artist/genre/work-type references. One async
//! mutex covers the whole check-then-create sequence, so two resolutions of
//! the same (kind, name) never both insert.

use crate::db::references::{find_reference, insert_reference, load_references};
use crate::error::PersistError;
use crate::models::RefKind;
use crate::utils::retry_on_lock;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Canonical bucket for empty or placeholder names
pub const UNKNOWN_NAME: &str = "Unknown";

/// Names folded into [`UNKNOWN_NAME`] (compared case-insensitively)
const PLACEHOLDER_NAMES: [&str; 8] = ["_", "-", "?", "unknown", "n/a", "na", "none", "null"];

/// Where a resolved id came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionOrigin {
    /// Already resolved earlier in this run (or warmed)
    Cached,
    /// Found in the store on a cache miss
    Existing,
    /// Inserted by this resolution
    Created,
    /// Dry run: would have been inserted
    Provisional,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedReference {
    pub kind: RefKind,
    pub name: String,
    pub id: Uuid,
    pub origin: ResolutionOrigin,
}

/// Fold empty and placeholder names into the canonical "Unknown" bucket
pub fn canonical_name(name: Option<&str>) -> String {
    let trimmed = name.map(str::trim).unwrap_or_default();
    let lower = trimmed.to_lowercase();

    if trimmed.is_empty() || PLACEHOLDER_NAMES.contains(&lower.as_str()) {
        UNKNOWN_NAME.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Per-run reference cache
pub struct MetadataCache {
    pool: SqlitePool,
    dry_run: bool,
    max_lock_wait_ms: u64,
    entries: Mutex<HashMap<(RefKind, String), Uuid>>,
}

impl MetadataCache {
    pub fn new(pool: SqlitePool, dry_run: bool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            dry_run,
            max_lock_wait_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Preload every reference row in the store; returns the entry count
    pub async fn warm(&self) -> comicdb_common::Result<usize> {
        let mut entries = self.entries.lock().await;

        for kind in RefKind::ALL {
            for (name, id) in load_references(&self.pool, kind).await? {
                entries.insert((kind, name), id);
            }
        }

        debug!(entries = entries.len(), "Metadata cache warmed");
        Ok(entries.len())
    }

    /// Id for (kind, name), creating the reference when absent
    pub async fn resolve(&self, kind: RefKind, name: Option<&str>) -> Result<Uuid, PersistError> {
        Ok(self.resolve_with_origin(kind, name).await?.id)
    }

    pub async fn resolve_with_origin(
        &self,
        kind: RefKind,
        name: Option<&str>,
    ) -> Result<ResolvedReference, PersistError> {
        let name = canonical_name(name);
        let key = (kind, name.clone());

        // Held until the id is cached, whatever the outcome
        let mut entries = self.entries.lock().await;

        if let Some(id) = entries.get(&key) {
            return Ok(ResolvedReference {
                kind,
                name,
                id: *id,
                origin: ResolutionOrigin::Cached,
            });
        }

        let (id, origin) = match find_reference(&self.pool, kind, &name).await? {
            Some(id) => (id, ResolutionOrigin::Existing),
            None if self.dry_run => (Uuid::new_v4(), ResolutionOrigin::Provisional),
            None => {
                let pool = &self.pool;
                let name_ref = name.as_str();
                let id = retry_on_lock("reference insert", self.max_lock_wait_ms, || async move {
                    insert_reference(pool, kind, name_ref).await
                })
                .await?;
                (id, ResolutionOrigin::Created)
            }
        };

        debug!(kind = %kind, name = %name, origin = ?origin, "Reference resolved");
        entries.insert(key, id);

        Ok(ResolvedReference { kind, name, id, origin })
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::references::count_references;
    use comicdb_common::db::init_memory_database;
    use std::sync::Arc;

    #[test]
    fn test_canonical_name_folds_placeholders() {
        for placeholder in [None, Some(""), Some("   "), Some("_"), Some(" _ "), Some("UNKNOWN"), Some("N/A"), Some("-")] {
            assert_eq!(canonical_name(placeholder), UNKNOWN_NAME, "{:?}", placeholder);
        }
        assert_eq!(canonical_name(Some("  Oda ")), "Oda");
    }

    #[tokio::test]
    async fn test_resolve_creates_once_then_caches() {
        let pool = init_memory_database().await.unwrap();
        let cache = MetadataCache::new(pool.clone(), false, 1000);

        let first = cache.resolve_with_origin(RefKind::Author, Some("Oda")).await.unwrap();
        let second = cache.resolve_with_origin(RefKind::Author, Some("Oda")).await.unwrap();

        assert_eq!(first.origin, ResolutionOrigin::Created);
        assert_eq!(second.origin, ResolutionOrigin::Cached);
        assert_eq!(first.id, second.id);
        assert_eq!(count_references(&pool, RefKind::Author).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_placeholders_share_one_bucket_per_kind() {
        let pool = init_memory_database().await.unwrap();
        let cache = MetadataCache::new(pool.clone(), false, 1000);

        let a = cache.resolve(RefKind::Artist, Some("_")).await.unwrap();
        let b = cache.resolve(RefKind::Artist, None).await.unwrap();
        let c = cache.resolve(RefKind::Artist, Some("unknown")).await.unwrap();
        let author = cache.resolve(RefKind::Author, Some("_")).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_ne!(a, author);
        assert_eq!(count_references(&pool, RefKind::Artist).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_inserts_once() {
        let pool = init_memory_database().await.unwrap();
        let cache = Arc::new(MetadataCache::new(pool.clone(), false, 1000));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.resolve(RefKind::Genre, Some("Action")).await.unwrap() })
            })
            .collect();

        let ids: Vec<Uuid> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(count_references(&pool, RefKind::Genre).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_warm_and_existing_origin() {
        let pool = init_memory_database().await.unwrap();
        let existing = insert_reference(&pool, RefKind::Genre, "Drama").await.unwrap();

        let cold = MetadataCache::new(pool.clone(), false, 1000);
        let found = cold.resolve_with_origin(RefKind::Genre, Some("Drama")).await.unwrap();
        assert_eq!(found.origin, ResolutionOrigin::Existing);
        assert_eq!(found.id, existing);

        let warm = MetadataCache::new(pool.clone(), false, 1000);
        assert_eq!(warm.warm().await.unwrap(), 1);
        let cached = warm.resolve_with_origin(RefKind::Genre, Some("Drama")).await.unwrap();
        assert_eq!(cached.origin, ResolutionOrigin::Cached);
    }

    #[tokio::test]
    async fn test_dry_run_never_writes() {
        let pool = init_memory_database().await.unwrap();
        let cache = MetadataCache::new(pool.clone(), true, 1000);

        let first = cache.resolve_with_origin(RefKind::WorkType, Some("Manga")).await.unwrap();
        let second = cache.resolve(RefKind::WorkType, Some("Manga")).await.unwrap();

        assert_eq!(first.origin, ResolutionOrigin::Provisional);
        assert_eq!(first.id, second);
        assert_eq!(count_references(&pool, RefKind::WorkType).await.unwrap(), 0);
    }
}
