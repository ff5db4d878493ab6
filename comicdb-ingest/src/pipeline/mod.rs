//! Pipeline orchestrator
//!
//! Loads every input, then processes entity kinds in dependency order:
//! reference vocabulary, works, chapters. Per-record failures are counted
//! and sampled into the [`RunReport`]; only conditions that make the run
//! meaningless return an error.

pub mod statistics;

pub use statistics::{ImageStats, KindStats, RunReport, UnmatchedSample};

use crate::config::IngestConfig;
use crate::db::chapters::{find_chapter, upsert_chapter, ChapterRow, PageRow};
use crate::db::works::{find_work_by_slug, load_work_summaries, upsert_work, work_exists, WorkRow};
use crate::db::{self, UpsertOutcome};
use crate::error::{IngestError, PersistError};
use crate::images::{CachedImage, ImageCache, ImageOrigin, ImageRequest};
use crate::loader::{self, ChapterSchema, LoadOutcome, Loaded, RecordSchema, ReferenceSchema, WorkSchema};
use crate::metadata_cache::{MetadataCache, ResolutionOrigin};
use crate::models::{format_number, RefKind, ValidatedChapterRecord, ValidatedReferenceRecord, ValidatedWorkRecord};
use crate::resolution::{ParentIndex, ResolutionEngine};
use crate::utils::retry_on_lock;
use sqlx::SqlitePool;
use statistics::PersistSample;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Input sources per entity kind (files or directories)
#[derive(Debug, Clone, Default)]
pub struct PipelineInputs {
    pub references: Vec<PathBuf>,
    pub works: Vec<PathBuf>,
    pub chapters: Vec<PathBuf>,
}

impl PipelineInputs {
    pub fn is_empty(&self) -> bool {
        self.references.is_empty() && self.works.is_empty() && self.chapters.is_empty()
    }
}

/// Loaded and validated records of every kind
#[derive(Debug)]
pub struct LoadedInputs {
    pub references: LoadOutcome<ValidatedReferenceRecord>,
    pub works: LoadOutcome<ValidatedWorkRecord>,
    pub chapters: LoadOutcome<ValidatedChapterRecord>,
}

impl LoadedInputs {
    fn sources_read(&self) -> usize {
        self.references.sources_read + self.works.sources_read + self.chapters.sources_read
    }

    fn sources_unreadable(&self) -> usize {
        self.references.unreadable.len() + self.works.unreadable.len() + self.chapters.unreadable.len()
    }
}

/// Load every source; fails when not a single document could be read
pub async fn load_inputs(inputs: &PipelineInputs) -> Result<LoadedInputs, IngestError> {
    let loaded = LoadedInputs {
        references: loader::load::<ReferenceSchema>(&inputs.references).await,
        works: loader::load::<WorkSchema>(&inputs.works).await,
        chapters: loader::load::<ChapterSchema>(&inputs.chapters).await,
    };

    if loaded.sources_read() == 0 {
        return Err(IngestError::NoReadableSources(loaded.sources_unreadable()));
    }

    Ok(loaded)
}

/// Run one full pipeline invocation
pub async fn run(config: &IngestConfig, inputs: &PipelineInputs) -> Result<RunReport, IngestError> {
    let loaded = load_inputs(inputs).await?;

    let pool = if config.dry_run {
        db::open_store_read_only(&config.database_path).await?
    } else {
        db::open_store(&config.database_path).await?
    };

    let context = RunContext::new(pool.clone(), config).await?;
    let report = context.execute(loaded).await;

    // Checkpoints the WAL so the next open sees a single file
    pool.close().await;

    Ok(report)
}

/// Per-run state: caches, the parent index and the report under construction
pub struct RunContext {
    pool: SqlitePool,
    config: IngestConfig,
    metadata: MetadataCache,
    images: ImageCache,
    resolver: ResolutionEngine,
    report: RunReport,
    /// Dry run: chapter keys that would have been created
    planned_chapters: HashSet<(Uuid, u64)>,
}

impl RunContext {
    /// Build the context, warming caches from the store
    pub async fn new(pool: SqlitePool, config: &IngestConfig) -> Result<Self, IngestError> {
        let store_error = |e: comicdb_common::Error| IngestError::StoreUnavailable(e.to_string());

        let metadata = MetadataCache::new(pool.clone(), config.dry_run, config.persistence.max_lock_wait_ms);
        let warmed = metadata.warm().await.map_err(store_error)?;

        let index = ParentIndex::from_summaries(load_work_summaries(&pool).await.map_err(store_error)?);
        info!(references = warmed, works = index.len(), "Run context ready");

        let images = ImageCache::new(config.image_root.clone(), &config.images, config.dry_run)?;

        Ok(Self {
            pool,
            metadata,
            images,
            resolver: ResolutionEngine::new(index, config.resolution.clone()),
            report: RunReport::new(config.dry_run, config.report.unmatched_sample_cap),
            planned_chapters: HashSet::new(),
            config: config.clone(),
        })
    }

    /// Process loaded records and return the finished report
    pub async fn execute(mut self, loaded: LoadedInputs) -> RunReport {
        let LoadedInputs {
            references,
            works,
            chapters,
        } = loaded;

        for (kind, outcome_unreadable) in [
            (ReferenceSchema::KIND, &references.unreadable),
            (WorkSchema::KIND, &works.unreadable),
            (ChapterSchema::KIND, &chapters.unreadable),
        ] {
            if !outcome_unreadable.is_empty() {
                warn!(kind, count = outcome_unreadable.len(), "Sources skipped as unreadable");
            }
            self.report.record_unreadable(outcome_unreadable);
        }

        self.report.references.quarantined = references.invalid.len();
        self.report.record_quarantined(ReferenceSchema::KIND, &references.invalid);
        self.report.works.quarantined = works.invalid.len();
        self.report.record_quarantined(WorkSchema::KIND, &works.invalid);
        self.report.chapters.quarantined = chapters.invalid.len();
        self.report.record_quarantined(ChapterSchema::KIND, &chapters.invalid);

        info!(count = references.valid.len(), "Processing reference records");
        for record in &references.valid {
            self.process_reference(record).await;
        }
        info!("References: {}", self.report.references.display_string());

        info!(count = works.valid.len(), "Processing work records");
        for record in &works.valid {
            self.process_work(record).await;
        }
        info!("Works: {}", self.report.works.display_string());

        info!(count = chapters.valid.len(), "Processing chapter records");
        for record in &chapters.valid {
            self.process_chapter(record).await;
        }
        info!("Chapters: {}", self.report.chapters.display_string());

        self.report.images.network_requests = self.images.requests_issued();
        info!("Images: {}", self.report.images.display_string());

        self.report.finish();
        self.report
    }

    async fn process_reference(&mut self, loaded: &Loaded<ValidatedReferenceRecord>) {
        let record = &loaded.record;
        self.report.references.processed += 1;

        match self.metadata.resolve_with_origin(record.kind, Some(&record.name)).await {
            Ok(resolved) => match resolved.origin {
                ResolutionOrigin::Created | ResolutionOrigin::Provisional => self.report.references.created += 1,
                ResolutionOrigin::Existing | ResolutionOrigin::Cached => self.report.references.updated += 1,
            },
            Err(e) => {
                let key = format!("{}:{}", record.kind, record.name);
                self.record_persist_error(ReferenceSchema::KIND, loaded, key, e);
            }
        }
    }

    async fn process_work(&mut self, loaded: &Loaded<ValidatedWorkRecord>) {
        let record = &loaded.record;
        self.report.works.processed += 1;

        let row = match self.build_work_row(record).await {
            Ok(row) => row,
            Err(e) => {
                self.record_persist_error(WorkSchema::KIND, loaded, record.slug.clone(), e);
                return;
            }
        };

        let outcome = if self.config.dry_run {
            self.plan_work(&row).await
        } else {
            let (pool, mode) = (&self.pool, self.config.persistence.child_sync);
            let row_ref = &row;
            retry_on_lock("work upsert", self.config.persistence.max_lock_wait_ms, || async move {
                upsert_work(pool, row_ref, mode).await
            })
            .await
            .map_err(PersistError::from)
        };

        match outcome {
            Ok(outcome) => {
                if outcome.is_created() {
                    self.report.works.created += 1;
                } else {
                    self.report.works.updated += 1;
                }
                self.resolver.register(outcome.id(), &row.slug, &row.title);
                debug!(slug = %row.slug, id = %outcome.id(), created = outcome.is_created(), "Work persisted");
            }
            Err(e) => self.record_persist_error(WorkSchema::KIND, loaded, row.slug.clone(), e),
        }
    }

    /// Resolve references and the cover image into a writable row
    async fn build_work_row(&mut self, record: &ValidatedWorkRecord) -> Result<WorkRow, PersistError> {
        let author_id = self.metadata.resolve(RefKind::Author, record.author.as_deref()).await?;
        let artist_id = self.metadata.resolve(RefKind::Artist, record.artist.as_deref()).await?;
        let type_id = self.metadata.resolve(RefKind::WorkType, record.work_type.as_deref()).await?;

        let mut genre_ids = Vec::with_capacity(record.genres.len());
        for genre in &record.genres {
            let id = self.metadata.resolve(RefKind::Genre, Some(genre)).await?;
            if !genre_ids.contains(&id) {
                genre_ids.push(id);
            }
        }

        let cover_path = match &record.cover_url {
            Some(url) => {
                let namespace = format!("covers/{}", record.slug);
                match self.images.acquire(url, &namespace).await {
                    Ok(image) => {
                        self.count_image(&image);
                        image.relative_path
                    }
                    Err(e) => {
                        warn!(slug = %record.slug, url = %e.url, error = %e.message, "Cover download failed, using placeholder");
                        self.report.images.failed += 1;
                        self.report.images.placeholder += 1;
                        self.config.images.placeholder.clone()
                    }
                }
            }
            None => {
                self.report.images.placeholder += 1;
                self.config.images.placeholder.clone()
            }
        };

        Ok(WorkRow {
            slug: record.slug.clone(),
            title: record.title.clone(),
            description: record.description.clone(),
            status: record.status.clone(),
            author_id,
            artist_id,
            type_id,
            cover_path: Some(cover_path),
            source_url: record.source_url.clone(),
            release_year: record.release_year,
            rating: record.rating,
            genre_ids,
        })
    }

    /// Dry run: classify the work without writing
    async fn plan_work(&self, row: &WorkRow) -> Result<UpsertOutcome, PersistError> {
        if let Some(entry) = self.resolver.index().by_slug(&row.slug) {
            return Ok(UpsertOutcome::Updated(entry.id));
        }
        Ok(match find_work_by_slug(&self.pool, &row.slug).await? {
            Some(id) => UpsertOutcome::Updated(id),
            None => UpsertOutcome::Created(Uuid::new_v4()),
        })
    }

    async fn process_chapter(&mut self, loaded: &Loaded<ValidatedChapterRecord>) {
        let record = &loaded.record;
        self.report.chapters.processed += 1;

        let candidate = match self.resolver.resolve(&record.parent) {
            Some(candidate) => candidate,
            None => {
                self.report.chapters.unmatched += 1;
                info!(
                    source = %loaded.source.display(),
                    index = loaded.index,
                    chapter = %record.raw_identifier(),
                    attempted = %record.parent.attempted(),
                    "Chapter parent unmatched"
                );
                self.report.record_unmatched(UnmatchedSample {
                    source: loaded.source.clone(),
                    index: loaded.index,
                    raw_identifier: record.raw_identifier(),
                    attempted: record.parent.attempted(),
                });
                return;
            }
        };

        let work_id = candidate.parent_id;
        let key = format!("{}#{}", work_id, format_number(record.number));

        // Fail closed: never write a chapter whose parent is not stored
        if !self.config.dry_run {
            match work_exists(&self.pool, work_id).await {
                Ok(true) => {}
                Ok(false) => {
                    self.record_persist_error(ChapterSchema::KIND, loaded, key, PersistError::MissingParent(work_id));
                    return;
                }
                Err(e) => {
                    self.record_persist_error(ChapterSchema::KIND, loaded, key, e.into());
                    return;
                }
            }
        }

        let work_slug = self
            .resolver
            .index()
            .by_id(work_id)
            .map(|entry| entry.normalized_slug.clone())
            .unwrap_or_else(|| work_id.to_string());
        let namespace = format!("chapters/{}/{}", work_slug, format_number(record.number));

        let requests: Vec<ImageRequest> = record
            .image_urls
            .iter()
            .map(|url| ImageRequest::new(url.as_str(), namespace.as_str()))
            .collect();

        let mut pages = Vec::with_capacity(requests.len());
        for (request, result) in requests.iter().zip(self.images.acquire_batch(&requests).await) {
            match result {
                Ok(image) => {
                    self.count_image(&image);
                    pages.push(PageRow {
                        source_url: request.url.clone(),
                        file_path: Some(image.relative_path),
                    });
                }
                Err(e) => {
                    warn!(chapter = %key, url = %e.url, error = %e.message, "Page download failed");
                    self.report.images.failed += 1;
                    pages.push(PageRow {
                        source_url: request.url.clone(),
                        file_path: None,
                    });
                }
            }
        }

        let row = ChapterRow {
            work_id,
            number: record.number,
            title: record.title.clone(),
            slug: record.slug.clone(),
            source_url: record.source_url.clone(),
            published_at: record.published_at.clone(),
            pages,
        };

        let outcome = if self.config.dry_run {
            self.plan_chapter(&row).await
        } else {
            let (pool, mode) = (&self.pool, self.config.persistence.child_sync);
            let row_ref = &row;
            retry_on_lock("chapter upsert", self.config.persistence.max_lock_wait_ms, || async move {
                upsert_chapter(pool, row_ref, mode).await
            })
            .await
            .map_err(PersistError::from)
        };

        match outcome {
            Ok(outcome) => {
                if outcome.is_created() {
                    self.report.chapters.created += 1;
                } else {
                    self.report.chapters.updated += 1;
                }
                debug!(
                    chapter = %key,
                    stage = candidate.stage_name(),
                    pages = row.pages.len(),
                    created = outcome.is_created(),
                    "Chapter persisted"
                );
            }
            Err(e) => self.record_persist_error(ChapterSchema::KIND, loaded, key, e),
        }
    }

    /// Dry run: classify the chapter without writing
    async fn plan_chapter(&mut self, row: &ChapterRow) -> Result<UpsertOutcome, PersistError> {
        let key = (row.work_id, row.number.to_bits());
        if let Some(id) = find_chapter(&self.pool, row.work_id, row.number).await? {
            return Ok(UpsertOutcome::Updated(id));
        }
        if self.planned_chapters.insert(key) {
            Ok(UpsertOutcome::Created(Uuid::new_v4()))
        } else {
            Ok(UpsertOutcome::Updated(Uuid::new_v4()))
        }
    }

    fn count_image(&mut self, image: &CachedImage) {
        match image.origin {
            ImageOrigin::Fresh => self.report.images.fresh += 1,
            ImageOrigin::Cache => self.report.images.cache += 1,
            ImageOrigin::Planned => self.report.images.planned += 1,
        }
    }

    /// Classify a store failure: conflicts are skipped, the rest errored
    fn record_persist_error<T>(&mut self, kind: &str, loaded: &Loaded<T>, key: String, error: PersistError) {
        let stats = match kind {
            k if k == ReferenceSchema::KIND => &mut self.report.references,
            k if k == WorkSchema::KIND => &mut self.report.works,
            _ => &mut self.report.chapters,
        };

        if error.is_conflict() {
            stats.skipped += 1;
            warn!(
                kind,
                source = %loaded.source.display(),
                index = loaded.index,
                key = %key,
                reason = %error,
                "Record skipped"
            );
        } else {
            stats.errored += 1;
            tracing::error!(
                kind,
                source = %loaded.source.display(),
                index = loaded.index,
                key = %key,
                error = %error,
                "Record failed"
            );
        }

        self.report.record_persist_failure(PersistSample {
            kind: kind.to_string(),
            source: loaded.source.clone(),
            index: loaded.index,
            key,
            reason: error.to_string(),
        });
    }
}
