//! Run statistics and the diagnostic report

use crate::error::{IngestError, ParseError};
use crate::loader::Quarantined;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Per-entity-kind counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindStats {
    /// Records that passed validation and entered processing
    pub processed: usize,
    pub created: usize,
    pub updated: usize,
    /// Conflicts: duplicate, constraint violation, missing parent
    pub skipped: usize,
    pub quarantined: usize,
    pub unmatched: usize,
    /// Unexpected store failures
    pub errored: usize,
}

impl KindStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} processed, {} created, {} updated, {} skipped, {} quarantined, {} unmatched, {} errored",
            self.processed,
            self.created,
            self.updated,
            self.skipped,
            self.quarantined,
            self.unmatched,
            self.errored
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageStats {
    pub fresh: usize,
    pub cache: usize,
    pub failed: usize,
    /// Covers replaced by the placeholder path
    pub placeholder: usize,
    /// Dry run only
    pub planned: usize,
    pub network_requests: u64,
}

impl ImageStats {
    pub fn display_string(&self) -> String {
        format!(
            "{} downloaded, {} from cache, {} failed, {} placeholder covers, {} planned",
            self.fresh, self.cache, self.failed, self.placeholder, self.planned
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedSample {
    pub source: PathBuf,
    pub index: usize,
    pub raw_identifier: String,
    pub attempted: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarantineSample {
    pub kind: String,
    pub source: PathBuf,
    pub index: usize,
    pub reason: String,
}

/// Record skipped or failed at the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistSample {
    pub kind: String,
    pub source: PathBuf,
    pub index: usize,
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnreadableSource {
    pub path: PathBuf,
    pub message: String,
}

/// Everything an operator needs to audit one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    pub references: KindStats,
    pub works: KindStats,
    pub chapters: KindStats,
    pub images: ImageStats,
    pub unreadable_sources: Vec<UnreadableSource>,
    /// Capped samples; totals live in the per-kind counters
    pub unmatched: Vec<UnmatchedSample>,
    pub quarantined: Vec<QuarantineSample>,
    pub persistence_failures: Vec<PersistSample>,
    pub sample_cap: usize,
}

impl RunReport {
    pub fn new(dry_run: bool, sample_cap: usize) -> Self {
        Self {
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            references: KindStats::default(),
            works: KindStats::default(),
            chapters: KindStats::default(),
            images: ImageStats::default(),
            unreadable_sources: Vec::new(),
            unmatched: Vec::new(),
            quarantined: Vec::new(),
            persistence_failures: Vec::new(),
            sample_cap,
        }
    }

    pub fn record_unreadable(&mut self, errors: &[ParseError]) {
        self.unreadable_sources.extend(errors.iter().map(|e| UnreadableSource {
            path: e.path.clone(),
            message: e.message.clone(),
        }));
    }

    pub fn record_quarantined(&mut self, kind: &str, records: &[Quarantined]) {
        let room = self.sample_cap.saturating_sub(self.quarantined.len());
        self.quarantined.extend(records.iter().take(room).map(|q| QuarantineSample {
            kind: kind.to_string(),
            source: q.source.clone(),
            index: q.index,
            reason: q.reason.clone(),
        }));
    }

    pub fn record_unmatched(&mut self, sample: UnmatchedSample) {
        if self.unmatched.len() < self.sample_cap {
            self.unmatched.push(sample);
        }
    }

    pub fn record_persist_failure(&mut self, sample: PersistSample) {
        if self.persistence_failures.len() < self.sample_cap {
            self.persistence_failures.push(sample);
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    fn kinds(&self) -> [(&'static str, &KindStats); 3] {
        [
            ("references", &self.references),
            ("works", &self.works),
            ("chapters", &self.chapters),
        ]
    }

    /// Records that hit an unexpected store failure
    pub fn total_errored(&self) -> usize {
        self.kinds().iter().map(|(_, stats)| stats.errored).sum()
    }

    /// 0 for a clean run, 2 when any record hit an unexpected store failure
    pub fn exit_code(&self) -> i32 {
        if self.total_errored() > 0 {
            2
        } else {
            0
        }
    }

    /// Terminal summary, one line per category
    pub fn summary_lines(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.dry_run {
            lines.push("DRY RUN: no store or image writes were made".to_string());
        }
        for (name, stats) in self.kinds() {
            lines.push(format!("{:<10} {}", name, stats.display_string()));
        }
        lines.push(format!("{:<10} {}", "images", self.images.display_string()));
        if !self.unreadable_sources.is_empty() {
            lines.push(format!("{} unreadable source(s)", self.unreadable_sources.len()));
        }
        if self.chapters.unmatched > self.unmatched.len() {
            lines.push(format!(
                "{} unmatched chapter(s), first {} listed in the report",
                self.chapters.unmatched,
                self.unmatched.len()
            ));
        }
        lines
    }

    /// Write the report as pretty JSON
    pub fn write_json(&self, path: &Path) -> Result<(), IngestError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| IngestError::Config(format!("Cannot serialize report: {}", e)))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
