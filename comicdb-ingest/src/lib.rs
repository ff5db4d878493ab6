//! comicdb-ingest library
//!
//! Batch ingestion and reconciliation of scraped comic works and chapters
//! into the canonical comicdb store. The binary is a thin CLI over
//! [`pipeline::run`]; integration tests drive the same entry points.

pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod loader;
pub mod metadata_cache;
pub mod models;
pub mod pipeline;
pub mod resolution;
pub mod text;
pub mod utils;

pub use crate::config::{CliOverrides, IngestConfig};
pub use crate::error::IngestError;
pub use crate::pipeline::{run, PipelineInputs, RunContext, RunReport};
