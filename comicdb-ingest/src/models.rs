//! Validated record types flowing through one run

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Low-cardinality reference vocabulary kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefKind {
    Author,
    Artist,
    Genre,
    WorkType,
}

impl RefKind {
    pub const ALL: [RefKind; 4] = [RefKind::Author, RefKind::Artist, RefKind::Genre, RefKind::WorkType];

    /// Backing table in the canonical store
    pub fn table(self) -> &'static str {
        match self {
            RefKind::Author => "authors",
            RefKind::Artist => "artists",
            RefKind::Genre => "genres",
            RefKind::WorkType => "work_types",
        }
    }
}

impl fmt::Display for RefKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RefKind::Author => "author",
            RefKind::Artist => "artist",
            RefKind::Genre => "genre",
            RefKind::WorkType => "work_type",
        };
        f.write_str(name)
    }
}

impl FromStr for RefKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "author" | "authors" | "writer" => Ok(RefKind::Author),
            "artist" | "artists" | "illustrator" => Ok(RefKind::Artist),
            "genre" | "genres" | "tag" => Ok(RefKind::Genre),
            "type" | "work_type" | "worktype" | "format" => Ok(RefKind::WorkType),
            other => Err(other.to_string()),
        }
    }
}

/// Standalone reference record (author/artist/genre/type vocabulary)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedReferenceRecord {
    pub kind: RefKind,
    pub name: String,
}

/// Schema-checked work (comic series) record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedWorkRecord {
    /// Natural key, always in slug form
    pub slug: String,
    pub title: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub author: Option<String>,
    pub artist: Option<String>,
    pub work_type: Option<String>,
    pub genres: Vec<String>,
    pub cover_url: Option<String>,
    pub source_url: Option<String>,
    pub release_year: Option<i64>,
    pub rating: Option<f64>,
}

/// Raw parent reference carried by a chapter record
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParentRef {
    /// Slug-ish identifier, when the source had a slug field
    pub slug: Option<String>,
    /// Title or free text naming the parent
    pub title: Option<String>,
    /// Source URL that may embed the parent slug
    pub url: Option<String>,
}

impl ParentRef {
    /// Candidate used by the slug-oriented stages
    pub fn slug_candidate(&self) -> Option<&str> {
        self.slug.as_deref().or(self.title.as_deref())
    }

    /// Candidate used by the title stage
    pub fn title_candidate(&self) -> Option<&str> {
        self.title.as_deref().or(self.slug.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.slug.is_none() && self.title.is_none() && self.url.is_none()
    }

    /// Value shown in the unmatched report
    pub fn attempted(&self) -> String {
        self.slug_candidate()
            .or(self.url.as_deref())
            .unwrap_or_default()
            .to_string()
    }
}

/// Schema-checked chapter (sub-unit) record
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedChapterRecord {
    pub parent: ParentRef,
    pub number: f64,
    pub title: Option<String>,
    pub slug: Option<String>,
    pub source_url: Option<String>,
    pub published_at: Option<String>,
    /// Page image URLs in reading order
    pub image_urls: Vec<String>,
}

impl ValidatedChapterRecord {
    /// The chapter's own identifier for diagnostics
    pub fn raw_identifier(&self) -> String {
        self.slug
            .clone()
            .or_else(|| self.title.clone())
            .unwrap_or_else(|| format!("#{}", format_number(self.number)))
    }
}

/// "12" for whole numbers, "12.5" otherwise
pub fn format_number(number: f64) -> String {
    if number.fract() == 0.0 {
        format!("{}", number as i64)
    } else {
        format!("{}", number)
    }
}
