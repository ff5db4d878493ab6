//! Image acquisition and caching
//!
//! One durable local copy per remote URL. The filesystem existence check is
//! the cross-run guarantee; a per-run map keyed by source URL is the in-run
//! one. Failures are kept in that map too, so a broken URL shared by many
//! records is tried once per run. Downloads are retried with capped exponential backoff and written
//! through a `.part` sibling so a partial file is never taken for a hit.

pub mod filename;

use crate::config::ImageSettings;
use crate::error::{DownloadError, IngestError};
use filename::{derive_filename, namespace_dir, relative_path};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Backoff ceiling between attempts
const MAX_BACKOFF: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageOrigin {
    /// Downloaded by this call
    Fresh,
    /// Already on disk, or already acquired earlier in the run
    Cache,
    /// Dry run: would have been downloaded
    Planned,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CachedImage {
    pub source_url: String,
    pub local_path: PathBuf,
    /// `namespace/filename`, as stored in the canonical store
    pub relative_path: String,
    pub size_bytes: u64,
    pub origin: ImageOrigin,
}

/// Per-call acquisition options
#[derive(Debug, Clone, PartialEq)]
pub struct AcquireOptions {
    /// Attempts including the first
    pub max_retries: u32,
    /// Per-attempt timeout
    pub timeout: Duration,
    pub skip_if_exists: bool,
    pub retry_base_delay: Duration,
}

impl AcquireOptions {
    pub fn from_settings(settings: &ImageSettings) -> Self {
        Self {
            max_retries: settings.max_retries.max(1),
            timeout: Duration::from_millis(settings.timeout_ms),
            skip_if_exists: settings.skip_if_exists,
            retry_base_delay: Duration::from_millis(settings.retry_base_delay_ms),
        }
    }

    /// Delay after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.retry_base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }
}

/// One entry of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    pub url: String,
    pub namespace: String,
}

impl ImageRequest {
    pub fn new(url: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            namespace: namespace.into(),
        }
    }
}

/// Per-run image cache
pub struct ImageCache {
    client: reqwest::Client,
    root: PathBuf,
    options: AcquireOptions,
    concurrency: usize,
    dry_run: bool,
    /// Outcome of every URL acquired this run
    acquired: Mutex<HashMap<String, Result<CachedImage, DownloadError>>>,
    requests: AtomicU64,
}

impl ImageCache {
    pub fn new(root: PathBuf, settings: &ImageSettings, dry_run: bool) -> Result<Self, IngestError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .build()
            .map_err(|e| IngestError::Config(format!("Cannot build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            root,
            options: AcquireOptions::from_settings(settings),
            concurrency: settings.concurrency.max(1),
            dry_run,
            acquired: Mutex::new(HashMap::new()),
            requests: AtomicU64::new(0),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &AcquireOptions {
        &self.options
    }

    /// Network requests issued so far this run
    pub fn requests_issued(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Acquire one URL with the configured options
    pub async fn acquire(&self, url: &str, namespace: &str) -> Result<CachedImage, DownloadError> {
        let options = self.options.clone();
        self.acquire_with(url, namespace, &options).await
    }

    pub async fn acquire_with(
        &self,
        url: &str,
        namespace: &str,
        options: &AcquireOptions,
    ) -> Result<CachedImage, DownloadError> {
        if let Some(previous) = self.acquired.lock().await.get(url) {
            return match previous {
                Ok(image) => Ok(CachedImage {
                    origin: match image.origin {
                        ImageOrigin::Planned => ImageOrigin::Planned,
                        _ => ImageOrigin::Cache,
                    },
                    ..image.clone()
                }),
                Err(error) => {
                    debug!(url, "Image already failed this run");
                    Err(error.clone())
                }
            };
        }

        let filename = derive_filename(url);
        let relative = relative_path(namespace, &filename);
        let destination = self.root.join(namespace_dir(namespace)).join(&filename);

        let image = if let Some(size) = existing_size(&destination, options.skip_if_exists).await {
            debug!(url, path = %destination.display(), size, "Image cache hit");
            CachedImage {
                source_url: url.to_string(),
                local_path: destination,
                relative_path: relative,
                size_bytes: size,
                origin: ImageOrigin::Cache,
            }
        } else if self.dry_run {
            debug!(url, path = %destination.display(), "Dry run: image download planned");
            CachedImage {
                source_url: url.to_string(),
                local_path: destination,
                relative_path: relative,
                size_bytes: 0,
                origin: ImageOrigin::Planned,
            }
        } else {
            match self.download(url, &destination, options).await {
                Ok(size) => CachedImage {
                    source_url: url.to_string(),
                    local_path: destination,
                    relative_path: relative,
                    size_bytes: size,
                    origin: ImageOrigin::Fresh,
                },
                Err(error) => {
                    self.acquired
                        .lock()
                        .await
                        .entry(url.to_string())
                        .or_insert_with(|| Err(error.clone()));
                    return Err(error);
                }
            }
        };

        self.acquired
            .lock()
            .await
            .entry(url.to_string())
            .or_insert_with(|| Ok(image.clone()));

        Ok(image)
    }

    /// Acquire many URLs, `concurrency` at a time
    ///
    /// URLs are deduplicated before chunking; every chunk is joined before
    /// the next starts. Results come back in input order.
    pub async fn acquire_batch(&self, requests: &[ImageRequest]) -> Vec<Result<CachedImage, DownloadError>> {
        let mut unique: Vec<&ImageRequest> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for request in requests {
            if !positions.contains_key(request.url.as_str()) {
                positions.insert(request.url.as_str(), unique.len());
                unique.push(request);
            }
        }

        let mut results: Vec<Result<CachedImage, DownloadError>> = Vec::with_capacity(unique.len());
        for chunk in unique.chunks(self.concurrency) {
            let chunk_results = join_all(chunk.iter().map(|r| self.acquire(&r.url, &r.namespace))).await;
            results.extend(chunk_results);
        }

        // Repeats of a URL report the first acquisition as a cache hit
        let mut reported = vec![false; results.len()];
        requests
            .iter()
            .map(|request| {
                let position = positions[request.url.as_str()];
                let result = results[position].clone();
                if std::mem::replace(&mut reported[position], true) {
                    result.map(|image| CachedImage {
                        origin: match image.origin {
                            ImageOrigin::Planned => ImageOrigin::Planned,
                            _ => ImageOrigin::Cache,
                        },
                        ..image
                    })
                } else {
                    result
                }
            })
            .collect()
    }

    async fn download(&self, url: &str, destination: &Path, options: &AcquireOptions) -> Result<u64, DownloadError> {
        let mut last_error = String::new();

        for attempt in 1..=options.max_retries {
            match self.fetch_once(url, destination, options.timeout).await {
                Ok(size) => {
                    debug!(url, path = %destination.display(), size, attempt, "Image downloaded");
                    return Ok(size);
                }
                Err(message) => {
                    last_error = message;
                    if attempt < options.max_retries {
                        let delay = options.backoff(attempt);
                        debug!(url, attempt, delay_ms = delay.as_millis() as u64, error = %last_error, "Image download failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        warn!(url, attempts = options.max_retries, error = %last_error, "Image download failed");
        Err(DownloadError {
            url: url.to_string(),
            attempts: options.max_retries,
            message: last_error,
        })
    }

    async fn fetch_once(&self, url: &str, destination: &Path, timeout: Duration) -> Result<u64, String> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status.as_u16()));
        }

        let bytes = response.bytes().await.map_err(|e| e.to_string())?;
        if bytes.is_empty() {
            return Err("empty response body".to_string());
        }

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| e.to_string())?;
        }

        let partial = partial_path(destination);
        tokio::fs::write(&partial, &bytes).await.map_err(|e| e.to_string())?;
        if let Err(e) = tokio::fs::rename(&partial, destination).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.to_string());
        }

        Ok(bytes.len() as u64)
    }
}

/// Size of a non-empty file at `path` when the cache check applies
async fn existing_size(path: &Path, skip_if_exists: bool) -> Option<u64> {
    if !skip_if_exists {
        return None;
    }
    let metadata = tokio::fs::metadata(path).await.ok()?;
    (metadata.is_file() && metadata.len() > 0).then_some(metadata.len())
}

fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}
