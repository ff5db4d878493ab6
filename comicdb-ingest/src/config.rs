//! Configuration resolution for comicdb-ingest
//!
//! Priority for every setting: CLI → ENV → TOML → compiled default.
//! The TOML file is shared with other comicdb tools; this module reads only
//! the ingest sections and ignores the rest.

use crate::error::IngestError;
use comicdb_common::config::{
    default_config_path, load_toml_config, read_toml_file, RootFolderInitializer,
    RootFolderResolver, TomlConfig,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Tool name used for the default config file name
pub const TOOL_NAME: &str = "comicdb-ingest";

pub const DATABASE_ENV: &str = "COMICDB_DATABASE";
pub const IMAGE_ROOT_ENV: &str = "COMICDB_IMAGE_ROOT";
pub const DRY_RUN_ENV: &str = "COMICDB_DRY_RUN";
pub const LOG_ENV: &str = "COMICDB_LOG";

/// `[images]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ImageSettings {
    /// Image cache root; `<root folder>/images` when unset
    pub root: Option<PathBuf>,
    /// Stored as cover path when a work has no usable cover
    pub placeholder: String,
    /// Downloads dispatched per batch chunk
    pub concurrency: usize,
    /// Attempts per URL (including the first)
    pub max_retries: u32,
    /// Per-attempt timeout
    pub timeout_ms: u64,
    /// First backoff delay; doubles per attempt
    pub retry_base_delay_ms: u64,
    /// Treat an existing non-empty file as a cache hit
    pub skip_if_exists: bool,
    pub user_agent: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        Self {
            root: None,
            placeholder: "placeholders/cover.jpg".to_string(),
            concurrency: 5,
            max_retries: 3,
            timeout_ms: 30_000,
            retry_base_delay_ms: 500,
            skip_if_exists: true,
            user_agent: format!("comicdb-ingest/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// `[resolution]` section: fuzzy thresholds and URL markers
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolutionSettings {
    pub strict_ratio: f64,
    pub strict_floor: usize,
    pub loose_ratio: f64,
    pub loose_floor: usize,
    /// Path segments after which a URL carries the parent slug
    pub url_markers: Vec<String>,
}

impl Default for ResolutionSettings {
    fn default() -> Self {
        Self {
            strict_ratio: 0.2,
            strict_floor: 2,
            loose_ratio: 0.25,
            loose_floor: 3,
            url_markers: ["series", "comic", "comics", "manga", "manhwa", "title"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

/// `[report]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReportSettings {
    /// Maximum unmatched/quarantined samples kept in the report
    pub unmatched_sample_cap: usize,
    /// JSON report destination; terminal summary only when unset
    pub path: Option<PathBuf>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            unmatched_sample_cap: 50,
            path: None,
        }
    }
}

/// How child associations are synchronized on update
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChildSyncMode {
    /// Delete existing links and re-insert from the current record
    #[default]
    Replace,
    /// Keep existing links, add new ones
    Merge,
}

impl std::str::FromStr for ChildSyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(ChildSyncMode::Replace),
            "merge" => Ok(ChildSyncMode::Merge),
            other => Err(format!("unknown child sync mode '{}' (expected replace|merge)", other)),
        }
    }
}

/// `[persistence]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PersistenceSettings {
    pub child_sync: ChildSyncMode,
    /// Total retry budget for "database is locked"
    pub max_lock_wait_ms: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            child_sync: ChildSyncMode::Replace,
            max_lock_wait_ms: 5_000,
        }
    }
}

/// Ingest-specific contents of the TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestFileConfig {
    pub database: Option<PathBuf>,
    pub dry_run: bool,
    pub images: ImageSettings,
    pub resolution: ResolutionSettings,
    pub report: ReportSettings,
    pub persistence: PersistenceSettings,
}

/// Command-line overrides (all optional)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub root_folder: Option<PathBuf>,
    pub database: Option<PathBuf>,
    pub image_root: Option<PathBuf>,
    pub placeholder: Option<String>,
    pub concurrency: Option<usize>,
    pub max_retries: Option<u32>,
    pub timeout_ms: Option<u64>,
    pub report_path: Option<PathBuf>,
    pub child_sync: Option<ChildSyncMode>,
    pub dry_run: bool,
}

/// Fully resolved run configuration
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub database_path: PathBuf,
    pub image_root: PathBuf,
    pub dry_run: bool,
    pub log_level: String,
    pub log_file: Option<PathBuf>,
    pub images: ImageSettings,
    pub resolution: ResolutionSettings,
    pub report: ReportSettings,
    pub persistence: PersistenceSettings,
}

impl IngestConfig {
    /// Configuration rooted at `root` with compiled defaults (tests, embedding)
    pub fn with_root(root: &Path) -> Self {
        let initializer = RootFolderInitializer::new(root.to_path_buf());
        Self {
            database_path: initializer.database_path(),
            image_root: initializer.image_root(),
            dry_run: false,
            log_level: "info".to_string(),
            log_file: None,
            images: ImageSettings::default(),
            resolution: ResolutionSettings::default(),
            report: ReportSettings::default(),
            persistence: PersistenceSettings::default(),
        }
    }

    /// Resolve the configuration from CLI, environment and TOML
    pub fn resolve(cli: CliOverrides) -> Result<Self, IngestError> {
        let config_path = cli
            .config_path
            .clone()
            .or_else(|| default_config_path(TOOL_NAME));

        let shared: TomlConfig = load_toml_config(config_path.as_deref())?;
        let file: IngestFileConfig = match config_path.as_deref() {
            Some(path) => read_toml_file(path)?.unwrap_or_default(),
            None => IngestFileConfig::default(),
        };

        let root_folder = RootFolderResolver::new(cli.root_folder.clone(), &shared).resolve();
        let initializer = RootFolderInitializer::new(root_folder);
        debug!("Root folder: {}", initializer.root_folder().display());

        let database_path = cli
            .database
            .clone()
            .or_else(|| env_path(DATABASE_ENV))
            .or(file.database.clone())
            .unwrap_or_else(|| initializer.database_path());

        let image_root = cli
            .image_root
            .clone()
            .or_else(|| env_path(IMAGE_ROOT_ENV))
            .or(file.images.root.clone())
            .unwrap_or_else(|| initializer.image_root());

        let dry_run = cli.dry_run || env_flag(DRY_RUN_ENV).unwrap_or(file.dry_run);

        let mut images = file.images;
        if let Some(placeholder) = cli.placeholder {
            images.placeholder = placeholder;
        }
        if let Some(concurrency) = cli.concurrency {
            images.concurrency = concurrency;
        }
        if let Some(max_retries) = cli.max_retries {
            images.max_retries = max_retries;
        }
        if let Some(timeout_ms) = cli.timeout_ms {
            images.timeout_ms = timeout_ms;
        }

        let mut report = file.report;
        if cli.report_path.is_some() {
            report.path = cli.report_path;
        }

        let mut persistence = file.persistence;
        if let Some(mode) = cli.child_sync {
            persistence.child_sync = mode;
        }

        let log_level = std::env::var(LOG_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(shared.logging.level);

        let config = Self {
            database_path,
            image_root,
            dry_run,
            log_level,
            log_file: shared.logging.file,
            images,
            resolution: file.resolution,
            report,
            persistence,
        };
        config.validate()?;

        info!(
            database = %config.database_path.display(),
            image_root = %config.image_root.display(),
            dry_run = config.dry_run,
            "Configuration resolved"
        );

        Ok(config)
    }

    /// Reject settings that would make the run misbehave
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.images.concurrency == 0 {
            return Err(IngestError::Config("images.concurrency must be at least 1".to_string()));
        }
        if self.images.max_retries == 0 {
            return Err(IngestError::Config("images.max_retries must be at least 1".to_string()));
        }
        if self.images.timeout_ms == 0 {
            return Err(IngestError::Config("images.timeout_ms must be positive".to_string()));
        }
        for (name, ratio) in [
            ("resolution.strict_ratio", self.resolution.strict_ratio),
            ("resolution.loose_ratio", self.resolution.loose_ratio),
        ] {
            if !(0.0..=1.0).contains(&ratio) {
                return Err(IngestError::Config(format!("{} must be within 0.0..=1.0", name)));
            }
        }
        Ok(())
    }
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .map(PathBuf::from)
}

fn env_flag(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?;
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn clear_env() {
        for name in [DATABASE_ENV, IMAGE_ROOT_ENV, DRY_RUN_ENV, LOG_ENV] {
            std::env::remove_var(name);
        }
        std::env::remove_var(comicdb_common::config::ROOT_FOLDER_ENV);
    }

    #[test]
    fn test_file_config_defaults_when_sections_missing() {
        let parsed: IngestFileConfig = toml::from_str("dry_run = true").unwrap();

        assert!(parsed.dry_run);
        assert_eq!(parsed.images.concurrency, 5);
        assert_eq!(parsed.images.max_retries, 3);
        assert_eq!(parsed.resolution.strict_floor, 2);
        assert_eq!(parsed.persistence.child_sync, ChildSyncMode::Replace);
    }

    #[test]
    fn test_child_sync_mode_parses() {
        assert_eq!("Merge".parse::<ChildSyncMode>(), Ok(ChildSyncMode::Merge));
        assert!("append".parse::<ChildSyncMode>().is_err());

        let parsed: IngestFileConfig =
            toml::from_str("[persistence]\nchild_sync = \"merge\"").unwrap();
        assert_eq!(parsed.persistence.child_sync, ChildSyncMode::Merge);
    }

    #[test]
    #[serial]
    fn test_resolve_priority_cli_env_toml() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("ingest.toml");
        std::fs::write(
            &config_path,
            r#"
root_folder = "/toml/root"
database = "/toml/comicdb.db"

[images]
concurrency = 9
root = "/toml/images"
"#,
        )
        .unwrap();

        std::env::set_var(IMAGE_ROOT_ENV, "/env/images");

        let config = IngestConfig::resolve(CliOverrides {
            config_path: Some(config_path),
            concurrency: Some(2),
            ..CliOverrides::default()
        })
        .unwrap();

        clear_env();

        assert_eq!(config.database_path, PathBuf::from("/toml/comicdb.db"));
        assert_eq!(config.image_root, PathBuf::from("/env/images"));
        assert_eq!(config.images.concurrency, 2);
        assert!(!config.dry_run);
    }

    #[test]
    #[serial]
    fn test_dry_run_from_environment() {
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var(DRY_RUN_ENV, "yes");

        let config = IngestConfig::resolve(CliOverrides {
            config_path: Some(dir.path().join("absent.toml")),
            root_folder: Some(dir.path().to_path_buf()),
            ..CliOverrides::default()
        })
        .unwrap();

        clear_env();

        assert!(config.dry_run);
        assert_eq!(config.database_path, dir.path().join("comicdb.db"));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = IngestConfig::with_root(Path::new("/tmp/comicdb"));
        config.images.concurrency = 0;

        assert!(matches!(config.validate(), Err(IngestError::Config(_))));
    }
}
