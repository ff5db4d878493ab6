//! Record loader
//!
//! Reads input documents, locates the record list inside each, and
//! partitions records into valid and quarantined. A document that cannot be
//! read is skipped; a record that fails validation never halts the batch.

pub mod normalize;
pub mod schema;

pub use schema::{
    ChapterSchema, ParentShape, RecordSchema, RecordShape, ReferenceSchema, WorkSchema,
};

use crate::error::{ParseError, ValidationError};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::{DirEntry, WalkDir};

/// Container keys checked, in priority order, when a document is an object
pub const CONTAINER_KEYS: [&str; 6] = ["data", "items", "comics", "chapters", "users", "results"];

/// Where the record list was found inside a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentShape {
    /// Top-level array
    List,
    /// Object with a recognized container key
    Container(&'static str),
    /// Object whose largest array-valued property was taken
    LargestList(String),
}

/// Validated record plus where it came from
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub source: PathBuf,
    pub index: usize,
    pub record: T,
}

/// Record that failed its schema check
#[derive(Debug, Clone, Serialize)]
pub struct Quarantined {
    pub source: PathBuf,
    pub index: usize,
    pub reason: String,
    pub record: Value,
}

/// Result of loading every source for one entity kind
#[derive(Debug)]
pub struct LoadOutcome<T> {
    pub valid: Vec<Loaded<T>>,
    pub invalid: Vec<Quarantined>,
    pub unreadable: Vec<ParseError>,
    /// Documents that parsed successfully
    pub sources_read: usize,
}

impl<T> Default for LoadOutcome<T> {
    fn default() -> Self {
        Self {
            valid: Vec::new(),
            invalid: Vec::new(),
            unreadable: Vec::new(),
            sources_read: 0,
        }
    }
}

/// Expand source paths: files pass through, directories yield every
/// `*.json` beneath them in sorted order
pub fn expand_sources(paths: &[PathBuf]) -> (Vec<PathBuf>, Vec<ParseError>) {
    let mut files = Vec::new();
    let mut errors = Vec::new();

    for path in paths {
        if !path.is_dir() {
            files.push(path.clone());
            continue;
        }

        let mut found = Vec::new();
        let walker = WalkDir::new(path)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e));

        for entry in walker {
            match entry {
                Ok(entry) if entry.file_type().is_file() && has_json_extension(entry.path()) => {
                    found.push(entry.path().to_path_buf());
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(directory = %path.display(), "Error accessing entry: {}", e);
                    errors.push(ParseError {
                        path: e.path().map(Path::to_path_buf).unwrap_or_else(|| path.clone()),
                        message: e.to_string(),
                    });
                }
            }
        }

        debug!(directory = %path.display(), files = found.len(), "Expanded source directory");
        files.extend(found);
    }

    (files, errors)
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with('.'))
            .unwrap_or(false)
}

fn has_json_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Locate the record list inside a parsed document
pub fn extract_records(document: Value) -> Result<(DocumentShape, Vec<Value>), String> {
    match document {
        Value::Array(items) => Ok((DocumentShape::List, items)),
        Value::Object(mut object) => {
            for key in CONTAINER_KEYS {
                if matches!(object.get(key), Some(Value::Array(_))) {
                    if let Some(Value::Array(items)) = object.remove(key) {
                        return Ok((DocumentShape::Container(key), items));
                    }
                }
            }

            // Largest array-valued property; the first one wins a tie
            let largest = object
                .iter()
                .filter_map(|(key, value)| value.as_array().map(|items| (key.clone(), items.len())))
                .fold(None::<(String, usize)>, |best, (key, len)| match best {
                    Some((_, best_len)) if best_len >= len => best,
                    _ => Some((key, len)),
                });

            match largest {
                Some((key, _)) => match object.remove(&key) {
                    Some(Value::Array(items)) => Ok((DocumentShape::LargestList(key), items)),
                    _ => Err("document has no record list".to_string()),
                },
                None => Err("document object has no array-valued property".to_string()),
            }
        }
        _ => Err("document is neither a list nor an object".to_string()),
    }
}

/// Read and parse one document
pub async fn read_document(path: &Path) -> Result<(DocumentShape, Vec<Value>), ParseError> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

    let document: Value = serde_json::from_str(&contents).map_err(|e| ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    extract_records(document).map_err(|message| ParseError {
        path: path.to_path_buf(),
        message,
    })
}

/// Partition the records of already-parsed documents
pub fn partition<S: RecordSchema>(
    source: &Path,
    records: Vec<Value>,
    outcome: &mut LoadOutcome<S::Output>,
) {
    for (index, raw) in records.into_iter().enumerate() {
        match S::validate(&raw) {
            Ok(record) => outcome.valid.push(Loaded {
                source: source.to_path_buf(),
                index,
                record,
            }),
            Err(e) => {
                quarantine(source, index, raw, &e, S::KIND, outcome);
            }
        }
    }
}

fn quarantine<T>(
    source: &Path,
    index: usize,
    record: Value,
    reason: &ValidationError,
    kind: &str,
    outcome: &mut LoadOutcome<T>,
) {
    debug!(
        kind,
        source = %source.display(),
        index,
        reason = %reason,
        "Record quarantined"
    );
    outcome.invalid.push(Quarantined {
        source: source.to_path_buf(),
        index,
        reason: reason.to_string(),
        record,
    });
}

/// Load and validate every record of one kind from `paths`
pub async fn load<S: RecordSchema>(paths: &[PathBuf]) -> LoadOutcome<S::Output> {
    let (files, walk_errors) = expand_sources(paths);
    let mut outcome = LoadOutcome {
        unreadable: walk_errors,
        ..LoadOutcome::default()
    };

    for file in &files {
        match read_document(file).await {
            Ok((shape, records)) => {
                debug!(
                    kind = S::KIND,
                    source = %file.display(),
                    shape = ?shape,
                    records = records.len(),
                    "Document parsed"
                );
                outcome.sources_read += 1;
                partition::<S>(file, records, &mut outcome);
            }
            Err(e) => {
                warn!(kind = S::KIND, source = %e.path.display(), error = %e.message, "Skipping unreadable source");
                outcome.unreadable.push(e);
            }
        }
    }

    info!(
        kind = S::KIND,
        sources = files.len(),
        valid = outcome.valid.len(),
        quarantined = outcome.invalid.len(),
        unreadable = outcome.unreadable.len(),
        "Load complete"
    );

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_top_level_list() {
        let (shape, records) = extract_records(json!([{"title": "A"}, {"title": "B"}])).unwrap();
        assert_eq!(shape, DocumentShape::List);
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_extract_container_key_priority() {
        let doc = json!({
            "results": [1, 2, 3, 4],
            "data": [1],
            "meta": {"page": 1}
        });
        let (shape, records) = extract_records(doc).unwrap();
        assert_eq!(shape, DocumentShape::Container("data"));
        assert_eq!(records.len(), 1);
    }

    #[test]
    fn test_extract_falls_back_to_largest_list() {
        let doc = json!({
            "tags": ["a"],
            "series_list": [{"title": "A"}, {"title": "B"}],
            "count": 2
        });
        let (shape, records) = extract_records(doc).unwrap();
        assert_eq!(shape, DocumentShape::LargestList("series_list".to_string()));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_extract_rejects_non_lists() {
        assert!(extract_records(json!({"title": "lonely"})).is_err());
        assert!(extract_records(json!("text")).is_err());
    }

    #[test]
    fn test_partition_quarantines_with_reason() {
        let mut outcome = LoadOutcome::default();
        partition::<WorkSchema>(
            Path::new("works.json"),
            vec![json!({"title": "Naruto"}), json!({"rating": 5}), json!(7)],
            &mut outcome,
        );

        assert_eq!(outcome.valid.len(), 1);
        assert_eq!(outcome.invalid.len(), 2);
        assert_eq!(outcome.invalid[0].index, 1);
        assert_eq!(outcome.invalid[0].reason, "missing required field: title");
        assert_eq!(outcome.invalid[1].reason, "record is not a JSON object");
    }

    #[tokio::test]
    async fn test_load_skips_unreadable_source() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("a.json");
        let bad = dir.path().join("b.json");
        std::fs::write(&good, r#"{"comics": [{"title": "One Piece"}]}"#).unwrap();
        std::fs::write(&bad, "{ not json").unwrap();

        let outcome = load::<WorkSchema>(&[good, bad.clone()]).await;

        assert_eq!(outcome.sources_read, 1);
        assert_eq!(outcome.valid.len(), 1);
        assert_eq!(outcome.unreadable.len(), 1);
        assert_eq!(outcome.unreadable[0].path, bad);
    }

    #[tokio::test]
    async fn test_load_expands_directories_in_sorted_order() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        std::fs::write(dir.path().join("b.json"), r#"[{"title": "B"}]"#).unwrap();
        std::fs::write(dir.path().join("a.json"), r#"[{"title": "A"}]"#).unwrap();
        std::fs::write(dir.path().join("nested/c.json"), r#"[{"title": "C"}]"#).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let outcome = load::<WorkSchema>(&[dir.path().to_path_buf()]).await;

        let titles: Vec<_> = outcome.valid.iter().map(|l| l.record.title.as_str()).collect();
        assert_eq!(titles, vec!["A", "B", "C"]);
        assert_eq!(outcome.sources_read, 3);
    }
}
