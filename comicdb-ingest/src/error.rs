//! Error types for comicdb-ingest
//!
//! Per-record failures ([`ValidationError`], [`DownloadError`],
//! [`PersistError`]) are classified and counted; only [`IngestError`]
//! aborts a run.

use std::path::PathBuf;
use thiserror::Error;

/// Conditions that make a run meaningless
#[derive(Debug, Error)]
pub enum IngestError {
    /// Every input document failed to parse (or none were given)
    #[error("No readable input source ({0} source(s) failed to parse)")]
    NoReadableSources(usize),

    /// Store could not be opened or initialized
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error outside per-record handling (report file, image root)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// comicdb-common error
    #[error("Common error: {0}")]
    Common(#[from] comicdb_common::Error),
}

/// Unreadable input document; the source is skipped
#[derive(Debug, Clone, Error)]
#[error("Cannot read {path}: {message}")]
pub struct ParseError {
    pub path: PathBuf,
    pub message: String,
}

/// Record failed its schema check; the record is quarantined
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("record is not a JSON object")]
    NotAnObject,

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("unknown reference kind: {0}")]
    UnknownKind(String),
}

/// Image acquisition exhausted its retries; the owning record proceeds
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Download of {url} failed after {attempts} attempt(s): {message}")]
pub struct DownloadError {
    pub url: String,
    pub attempts: u32,
    pub message: String,
}

/// Store write failure, classified for the run report
#[derive(Debug, Error)]
pub enum PersistError {
    /// Unique constraint hit: "duplicate, skipped"
    #[error("duplicate, skipped: {0}")]
    Duplicate(String),

    /// Foreign-key or check constraint violated
    #[error("constraint {constraint} violated: {message}")]
    Constraint { constraint: String, message: String },

    /// Chapter parent is not a known work; nothing was written
    #[error("parent work {0} does not exist")]
    MissingParent(uuid::Uuid),

    /// Anything else
    #[error("{0}")]
    Other(String),
}

impl PersistError {
    /// Conflicts are skip-with-reason; everything else counts as an error
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            PersistError::Duplicate(_) | PersistError::Constraint { .. } | PersistError::MissingParent(_)
        )
    }
}

impl From<sqlx::Error> for PersistError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                if db_err.is_unique_violation() {
                    PersistError::Duplicate(message)
                } else if db_err.is_foreign_key_violation() || db_err.is_check_violation() {
                    // SQLite rarely names the constraint; fall back to its message
                    let constraint = db_err
                        .constraint()
                        .map(str::to_string)
                        .unwrap_or_else(|| message.clone());
                    PersistError::Constraint { constraint, message }
                } else {
                    PersistError::Other(err.to_string())
                }
            }
            _ => PersistError::Other(err.to_string()),
        }
    }
}

impl From<comicdb_common::Error> for PersistError {
    fn from(err: comicdb_common::Error) -> Self {
        match err {
            comicdb_common::Error::Database(db_err) => PersistError::from(db_err),
            other => PersistError::Other(other.to_string()),
        }
    }
}
