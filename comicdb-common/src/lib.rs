//! # comicdb Common Library
//!
//! Shared code for comicdb tools:
//! - Error type
//! - Configuration loading and root folder resolution
//! - Canonical store schema and initialization

pub mod config;
#[cfg(feature = "sqlx")]
pub mod db;
pub mod error;

pub use error::{Error, Result};
