//! Per-kind schema validation
//!
//! Each record's shape is detected once ([`RecordShape`], [`ParentShape`]);
//! field aliases are resolved inside the shape, never at call sites.

use super::normalize::{
    collapse_genres, collapse_reference, collapse_url, collapse_url_list, field, parse_float,
    parse_sequence_number, parse_year, text,
};
use crate::error::ValidationError;
use crate::models::{
    ParentRef, RefKind, ValidatedChapterRecord, ValidatedReferenceRecord, ValidatedWorkRecord,
};
use crate::text::slugify;
use serde_json::{Map, Value};

const TITLE_KEYS: &[&str] = &["title", "name"];
const SLUG_KEYS: &[&str] = &["slug"];
const DESCRIPTION_KEYS: &[&str] = &["description", "synopsis", "summary"];
const STATUS_KEYS: &[&str] = &["status", "publicationStatus"];
const AUTHOR_KEYS: &[&str] = &["author", "authors", "writer"];
const ARTIST_KEYS: &[&str] = &["artist", "artists", "illustrator"];
const WORK_TYPE_KEYS: &[&str] = &["workType", "work_type", "comicType", "type", "format"];
const GENRE_KEYS: &[&str] = &["genres", "genre", "tags"];
const COVER_KEYS: &[&str] = &["cover", "coverUrl", "cover_url", "coverImage", "image", "thumbnail"];
const URL_KEYS: &[&str] = &["url", "sourceUrl", "source_url", "link", "href"];
const YEAR_KEYS: &[&str] = &["releaseYear", "release_year", "year", "released"];
const RATING_KEYS: &[&str] = &["rating", "score"];

const NUMBER_KEYS: &[&str] = &["number", "chapterNumber", "chapter_number", "chapter", "episode", "no"];
const CHAPTER_TITLE_KEYS: &[&str] = &["title", "name", "chapterTitle"];
const CHAPTER_SLUG_KEYS: &[&str] = &["slug", "chapterSlug"];
const PAGE_KEYS: &[&str] = &["images", "pages", "imageUrls", "image_urls"];
const PUBLISHED_KEYS: &[&str] = &["publishedAt", "published_at", "releaseDate", "date", "uploadedAt"];

const PARENT_SLUG_KEYS: &[&str] = &[
    "comicSlug", "comic_slug", "seriesSlug", "series_slug", "mangaSlug", "manga_slug",
    "parentSlug", "parent_slug", "workSlug",
];
const PARENT_OBJECT_KEYS: &[&str] = &["comic", "series", "manga", "work", "parent"];
const PARENT_TITLE_KEYS: &[&str] = &[
    "comicTitle", "comic_title", "seriesTitle", "series_title", "mangaTitle", "manga_title",
    "comicName", "seriesName",
];

const REF_KIND_KEYS: &[&str] = &["kind", "category", "refType", "type"];
const REF_NAME_KEYS: &[&str] = &["name", "title", "value", "label"];

/// Known source-format variants of one record
#[derive(Debug, Clone, PartialEq)]
pub enum RecordShape {
    /// Fields at the top level
    Flat(Map<String, Value>),
    /// JSON:API style `{id, type, attributes: {...}}`; attributes are lifted
    AttributeWrapped {
        id: Option<String>,
        attributes: Map<String, Value>,
    },
}

impl RecordShape {
    pub fn detect(value: &Value) -> Result<Self, ValidationError> {
        let object = value.as_object().ok_or(ValidationError::NotAnObject)?;

        match object.get("attributes").and_then(Value::as_object) {
            Some(attributes) => {
                let mut lifted = attributes.clone();
                // Top-level siblings fill gaps, except the resource envelope
                for (key, value) in object {
                    if !matches!(key.as_str(), "attributes" | "type" | "id" | "relationships") {
                        lifted.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
                Ok(RecordShape::AttributeWrapped {
                    id: object.get("id").and_then(collapse_reference),
                    attributes: lifted,
                })
            }
            None => Ok(RecordShape::Flat(object.clone())),
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        match self {
            RecordShape::Flat(fields) => fields,
            RecordShape::AttributeWrapped { attributes, .. } => attributes,
        }
    }

    fn envelope_id(&self) -> Option<&str> {
        match self {
            RecordShape::Flat(_) => None,
            RecordShape::AttributeWrapped { id, .. } => id.as_deref(),
        }
    }
}

/// How a chapter record names its parent work
#[derive(Debug, Clone, PartialEq)]
pub enum ParentShape {
    /// Dedicated slug field (`comicSlug`, `seriesSlug`, ...)
    SlugKeyed { slug: String },
    /// Nested `comic`/`series`/... value: an object or free text
    ParentObject {
        slug: Option<String>,
        title: Option<String>,
        url: Option<String>,
    },
    /// Dedicated title field (`comicTitle`, `seriesTitle`, ...)
    TitleKeyed { title: String },
    /// Nothing but the chapter's own source URL
    UrlOnly,
    Missing,
}

impl ParentShape {
    pub fn detect(fields: &Map<String, Value>) -> Self {
        if let Some(slug) = field(fields, PARENT_SLUG_KEYS).and_then(collapse_reference) {
            return ParentShape::SlugKeyed { slug };
        }

        if let Some(parent) = field(fields, PARENT_OBJECT_KEYS) {
            match parent {
                Value::Object(object) => {
                    let slug = object.get("slug").and_then(text);
                    let title = field(object, TITLE_KEYS).and_then(collapse_reference);
                    let url = field(object, URL_KEYS).and_then(collapse_url);
                    if slug.is_some() || title.is_some() || url.is_some() {
                        return ParentShape::ParentObject { slug, title, url };
                    }
                }
                other => {
                    if let Some(title) = collapse_reference(other) {
                        return ParentShape::ParentObject {
                            slug: None,
                            title: Some(title),
                            url: None,
                        };
                    }
                }
            }
        }

        if let Some(title) = field(fields, PARENT_TITLE_KEYS).and_then(collapse_reference) {
            return ParentShape::TitleKeyed { title };
        }

        if field(fields, URL_KEYS).and_then(collapse_url).is_some() {
            return ParentShape::UrlOnly;
        }

        ParentShape::Missing
    }

    /// Parent reference, with the chapter's own URL as fallback URL
    pub fn into_parent_ref(self, chapter_url: Option<&str>) -> ParentRef {
        let chapter_url = chapter_url.map(str::to_string);
        match self {
            ParentShape::SlugKeyed { slug } => ParentRef {
                slug: Some(slug),
                title: None,
                url: chapter_url,
            },
            ParentShape::ParentObject { slug, title, url } => ParentRef {
                slug,
                title,
                url: chapter_url.or(url),
            },
            ParentShape::TitleKeyed { title } => ParentRef {
                slug: None,
                title: Some(title),
                url: chapter_url,
            },
            ParentShape::UrlOnly | ParentShape::Missing => ParentRef {
                slug: None,
                title: None,
                url: chapter_url,
            },
        }
    }
}

/// Per-kind schema applied to every raw record
pub trait RecordSchema {
    type Output;

    /// Entity kind label used in logs and reports
    const KIND: &'static str;

    fn validate(raw: &Value) -> Result<Self::Output, ValidationError>;
}

pub struct ReferenceSchema;
pub struct WorkSchema;
pub struct ChapterSchema;

impl RecordSchema for ReferenceSchema {
    type Output = ValidatedReferenceRecord;
    const KIND: &'static str = "reference";

    fn validate(raw: &Value) -> Result<Self::Output, ValidationError> {
        let shape = RecordShape::detect(raw)?;
        let fields = shape.fields();

        let kind_text = field(fields, REF_KIND_KEYS)
            .and_then(text)
            .ok_or(ValidationError::MissingField("kind"))?;
        let kind = kind_text
            .parse::<RefKind>()
            .map_err(ValidationError::UnknownKind)?;

        let name = field(fields, REF_NAME_KEYS)
            .and_then(collapse_reference)
            .ok_or(ValidationError::MissingField("name"))?;

        Ok(ValidatedReferenceRecord { kind, name })
    }
}

impl RecordSchema for WorkSchema {
    type Output = ValidatedWorkRecord;
    const KIND: &'static str = "work";

    fn validate(raw: &Value) -> Result<Self::Output, ValidationError> {
        let shape = RecordShape::detect(raw)?;
        let fields = shape.fields();

        let title = field(fields, TITLE_KEYS).and_then(collapse_reference);
        let raw_slug = field(fields, SLUG_KEYS)
            .and_then(collapse_reference)
            .or_else(|| shape.envelope_id().filter(|id| !is_numeric(id)).map(str::to_string));

        let slug = match (&raw_slug, &title) {
            (Some(slug), _) => slugify(slug),
            (None, Some(title)) => slugify(title),
            (None, None) => return Err(ValidationError::MissingField("title")),
        };
        if slug.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "slug",
                reason: "no alphanumeric characters".to_string(),
            });
        }
        // Slug-only records borrow the slug as display title
        let title = title.unwrap_or_else(|| raw_slug.clone().unwrap_or_else(|| slug.clone()));

        let release_year = match field(fields, YEAR_KEYS) {
            Some(value) => {
                let year = parse_year(value).ok_or_else(|| ValidationError::InvalidValue {
                    field: "release_year",
                    reason: format!("not a year: {}", value),
                })?;
                if !(1800..=2100).contains(&year) {
                    return Err(ValidationError::InvalidValue {
                        field: "release_year",
                        reason: format!("{} outside 1800..=2100", year),
                    });
                }
                Some(year)
            }
            None => None,
        };

        let rating = match field(fields, RATING_KEYS) {
            Some(value) => {
                let rating = parse_float(value)
                    .filter(|r| r.is_finite())
                    .ok_or_else(|| ValidationError::InvalidValue {
                        field: "rating",
                        reason: format!("not a number: {}", value),
                    })?;
                if !(0.0..=10.0).contains(&rating) {
                    return Err(ValidationError::InvalidValue {
                        field: "rating",
                        reason: format!("{} outside 0..=10", rating),
                    });
                }
                Some(rating)
            }
            None => None,
        };

        Ok(ValidatedWorkRecord {
            slug,
            title,
            description: field(fields, DESCRIPTION_KEYS).and_then(text),
            status: field(fields, STATUS_KEYS)
                .and_then(collapse_reference)
                .map(|s| s.to_lowercase()),
            author: field(fields, AUTHOR_KEYS).and_then(collapse_reference),
            artist: field(fields, ARTIST_KEYS).and_then(collapse_reference),
            work_type: field(fields, WORK_TYPE_KEYS).and_then(collapse_reference),
            genres: field(fields, GENRE_KEYS).map(collapse_genres).unwrap_or_default(),
            cover_url: field(fields, COVER_KEYS).and_then(collapse_url),
            source_url: field(fields, URL_KEYS).and_then(collapse_url),
            release_year,
            rating,
        })
    }
}

impl RecordSchema for ChapterSchema {
    type Output = ValidatedChapterRecord;
    const KIND: &'static str = "chapter";

    fn validate(raw: &Value) -> Result<Self::Output, ValidationError> {
        let shape = RecordShape::detect(raw)?;
        let fields = shape.fields();

        let number_value = field(fields, NUMBER_KEYS).ok_or(ValidationError::MissingField("number"))?;
        let number = parse_sequence_number(number_value)
            .filter(|n| n.is_finite() && *n >= 0.0)
            .ok_or_else(|| ValidationError::InvalidValue {
                field: "number",
                reason: format!("not a non-negative number: {}", number_value),
            })?;

        let source_url = field(fields, URL_KEYS).and_then(collapse_url);
        let parent = ParentShape::detect(fields).into_parent_ref(source_url.as_deref());
        if parent.is_empty() {
            return Err(ValidationError::MissingField("parent"));
        }

        Ok(ValidatedChapterRecord {
            parent,
            number,
            title: field(fields, CHAPTER_TITLE_KEYS).and_then(text),
            slug: field(fields, CHAPTER_SLUG_KEYS).and_then(text),
            source_url,
            published_at: field(fields, PUBLISHED_KEYS).and_then(text),
            image_urls: field(fields, PAGE_KEYS).map(collapse_url_list).unwrap_or_default(),
        })
    }
}

fn is_numeric(value: &str) -> bool {
    !value.is_empty() && value.chars().all(|c| c.is_ascii_digit())
}
