//! comicdb-ingest - batch ingestion of scraped comic data
//!
//! Loads reference, work and chapter documents, reconciles them against the
//! canonical store and prints a run summary. Exit status: 0 on a clean run,
//! 2 when any record hit an unexpected store failure, 1 when the run was
//! aborted.

use anyhow::{Context, Result};
use clap::Parser;
use comicdb_ingest::config::{ChildSyncMode, CliOverrides, IngestConfig, LOG_ENV};
use comicdb_ingest::pipeline::{self, PipelineInputs};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Ingest scraped comic works and chapters into the canonical store
#[derive(Parser, Debug)]
#[command(name = "comicdb-ingest", version)]
struct Args {
    /// Reference vocabulary documents (files or directories)
    #[arg(long, value_name = "PATH", num_args = 1..)]
    references: Vec<PathBuf>,

    /// Work documents (files or directories)
    #[arg(long, value_name = "PATH", num_args = 1..)]
    works: Vec<PathBuf>,

    /// Chapter documents (files or directories)
    #[arg(long, value_name = "PATH", num_args = 1..)]
    chapters: Vec<PathBuf>,

    /// TOML configuration file
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Root folder holding the store and image cache
    #[arg(long, value_name = "DIR")]
    root_folder: Option<PathBuf>,

    /// Canonical store path (overrides the root folder default)
    #[arg(long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Image cache directory
    #[arg(long, value_name = "DIR")]
    image_root: Option<PathBuf>,

    /// Cover path stored when a work has no usable cover
    #[arg(long)]
    placeholder: Option<String>,

    /// Concurrent image downloads
    #[arg(long)]
    concurrency: Option<usize>,

    /// Download attempts per image
    #[arg(long)]
    max_retries: Option<u32>,

    /// Per-attempt download timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Write the JSON run report to this path
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// Child association sync on update (replace | merge)
    #[arg(long)]
    child_sync: Option<ChildSyncMode>,

    /// Validate and resolve everything without writing to the store or disk
    #[arg(long)]
    dry_run: bool,
}

impl Args {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            config_path: self.config.clone(),
            root_folder: self.root_folder.clone(),
            database: self.database.clone(),
            image_root: self.image_root.clone(),
            placeholder: self.placeholder.clone(),
            concurrency: self.concurrency,
            max_retries: self.max_retries,
            timeout_ms: self.timeout_ms,
            report_path: self.report.clone(),
            child_sync: self.child_sync,
            dry_run: self.dry_run,
        }
    }

    fn inputs(&self) -> PipelineInputs {
        PipelineInputs {
            references: self.references.clone(),
            works: self.works.clone(),
            chapters: self.chapters.clone(),
        }
    }
}

fn init_logging(config: &IngestConfig) -> Result<()> {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &config.log_file {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Cannot open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(std::sync::Mutex::new(file))
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;
        }
        None => {
            builder
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to install logger: {}", e))?;
        }
    }

    Ok(())
}

async fn run(args: Args) -> Result<i32> {
    let config = IngestConfig::resolve(args.overrides()).context("Failed to resolve configuration")?;
    init_logging(&config)?;

    info!("Starting comicdb-ingest {}", env!("CARGO_PKG_VERSION"));
    info!("Database: {}", config.database_path.display());
    info!("Image root: {}", config.image_root.display());
    if config.dry_run {
        info!("Dry run: store and image writes are suppressed");
    }

    let inputs = args.inputs();
    if inputs.is_empty() {
        anyhow::bail!("No input given; pass --references, --works and/or --chapters");
    }

    let report = pipeline::run(&config, &inputs).await?;

    for line in report.summary_lines() {
        println!("{}", line);
    }

    if let Some(path) = &config.report.path {
        report
            .write_json(path)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    Ok(report.exit_code())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            error!("Run aborted: {:#}", e);
            eprintln!("comicdb-ingest: {:#}", e);
            ExitCode::from(1)
        }
    }
}
