//! Entity resolution engine
//!
//! Resolves a chapter's raw parent reference to exactly one known work by
//! folding over an ordered cascade of matchers. The first stage that names
//! a parent wins; later stages never run.

pub mod fuzzy;
pub mod index;
pub mod levenshtein;
pub mod matchers;

pub use index::{ParentEntry, ParentIndex};
pub use levenshtein::levenshtein;

use crate::config::ResolutionSettings;
use crate::models::ParentRef;
use matchers::Matcher;
use serde::Serialize;
use uuid::Uuid;

/// Cascade stages in evaluation order, with names for logs
pub const CASCADE: [(&str, Matcher); 7] = [
    ("exact_slug", matchers::exact_slug),
    ("normalized_slug", matchers::normalized_slug),
    ("substring_slug", matchers::substring_slug),
    ("title", matchers::title),
    ("url_derived", matchers::url_derived),
    ("aggressive_scan", matchers::aggressive_scan),
    ("fuzzy", matchers::fuzzy),
];

/// A resolved parent and the 1-based stage that found it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchCandidate {
    pub parent_id: Uuid,
    pub stage: u8,
}

impl MatchCandidate {
    pub fn stage_name(&self) -> &'static str {
        CASCADE[usize::from(self.stage) - 1].0
    }
}

pub struct ResolutionEngine {
    index: ParentIndex,
    settings: ResolutionSettings,
}

impl ResolutionEngine {
    pub fn new(index: ParentIndex, settings: ResolutionSettings) -> Self {
        Self { index, settings }
    }

    /// Resolve `parent`, or `None` when no stage matched
    pub fn resolve(&self, parent: &ParentRef) -> Option<MatchCandidate> {
        let candidate = CASCADE
            .iter()
            .enumerate()
            .find_map(|(i, (_, matcher))| {
                matcher(parent, &self.index, &self.settings).map(|entry| MatchCandidate {
                    parent_id: entry.id,
                    stage: i as u8 + 1,
                })
            });

        match &candidate {
            Some(found) => tracing::trace!(
                attempted = %parent.attempted(),
                stage = found.stage_name(),
                parent = %found.parent_id,
                "Parent resolved"
            ),
            None => tracing::debug!(attempted = %parent.attempted(), "No cascade stage matched"),
        }

        candidate
    }

    /// Register a work created during the run
    pub fn register(&mut self, id: Uuid, slug: &str, title: &str) {
        self.index.insert(id, slug, title);
    }

    pub fn index(&self) -> &ParentIndex {
        &self.index
    }
}
