//! Known-parent index
//!
//! Entries keep insertion order: store rows in slug order first, then works
//! created during the run. Every lookup map points at the first entry that
//! produced its key.

use crate::db::works::WorkSummary;
use crate::text::{lower_trim, slugify, title_key};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct ParentEntry {
    pub id: Uuid,
    /// Slug exactly as stored
    pub slug: String,
    /// Slug re-normalized
    pub normalized_slug: String,
    /// Title in slug form
    pub normalized_title: String,
}

impl ParentEntry {
    /// Text the fuzzy stage compares against
    pub fn fuzzy_target(&self) -> &str {
        if self.normalized_slug.is_empty() {
            &self.normalized_title
        } else {
            &self.normalized_slug
        }
    }
}

#[derive(Debug, Default)]
pub struct ParentIndex {
    entries: Vec<ParentEntry>,
    by_id: HashMap<Uuid, usize>,
    by_slug: HashMap<String, usize>,
    by_normalized_slug: HashMap<String, usize>,
    by_title_key: HashMap<String, usize>,
    by_title_lower: HashMap<String, usize>,
}

impl ParentIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index built from store rows (expected in slug order)
    pub fn from_summaries(works: Vec<WorkSummary>) -> Self {
        let mut index = Self::new();
        for work in works {
            index.insert(work.guid, &work.slug, &work.title);
        }
        index
    }

    /// Add a parent; a slug already indexed is left untouched
    pub fn insert(&mut self, id: Uuid, slug: &str, title: &str) {
        if self.by_slug.contains_key(slug) {
            return;
        }

        let position = self.entries.len();
        let entry = ParentEntry {
            id,
            slug: slug.to_string(),
            normalized_slug: slugify(slug),
            normalized_title: slugify(title),
        };

        self.by_id.entry(id).or_insert(position);
        self.by_slug.insert(entry.slug.clone(), position);
        self.by_normalized_slug
            .entry(entry.normalized_slug.clone())
            .or_insert(position);

        let key = title_key(title);
        if !key.is_empty() {
            self.by_title_key.entry(key).or_insert(position);
        }
        self.by_title_lower.entry(lower_trim(title)).or_insert(position);

        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[ParentEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn by_id(&self, id: Uuid) -> Option<&ParentEntry> {
        self.by_id.get(&id).map(|i| &self.entries[*i])
    }

    pub fn by_slug(&self, slug: &str) -> Option<&ParentEntry> {
        self.by_slug.get(slug).map(|i| &self.entries[*i])
    }

    pub fn by_normalized_slug(&self, slug: &str) -> Option<&ParentEntry> {
        self.by_normalized_slug.get(slug).map(|i| &self.entries[*i])
    }

    pub fn by_title_key(&self, key: &str) -> Option<&ParentEntry> {
        self.by_title_key.get(key).map(|i| &self.entries[*i])
    }

    pub fn by_title_lower(&self, title: &str) -> Option<&ParentEntry> {
        self.by_title_lower.get(title).map(|i| &self.entries[*i])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_indexes_every_key() {
        let mut index = ParentIndex::new();
        let id = Uuid::new_v4();
        index.insert(id, "Dr_Stone", "Dr. STONE");

        assert_eq!(index.by_slug("Dr_Stone").map(|e| e.id), Some(id));
        assert_eq!(index.by_id(id).map(|e| e.slug.as_str()), Some("Dr_Stone"));
        assert_eq!(index.by_normalized_slug("dr-stone").map(|e| e.id), Some(id));
        assert_eq!(index.by_title_key("drstone").map(|e| e.id), Some(id));
        assert_eq!(index.by_title_lower("dr. stone").map(|e| e.id), Some(id));
    }

    #[test]
    fn test_duplicate_slug_keeps_first() {
        let mut index = ParentIndex::new();
        let first = Uuid::new_v4();
        index.insert(first, "naruto", "Naruto");
        index.insert(Uuid::new_v4(), "naruto", "Naruto Again");

        assert_eq!(index.len(), 1);
        assert_eq!(index.by_slug("naruto").map(|e| e.id), Some(first));
    }
}
