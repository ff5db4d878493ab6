//! Test helper utilities
//!
//! Shared fixtures for comicdb-ingest integration tests: a local image
//! server that counts requests, JSON document writers and a fast config.

#![allow(dead_code)]

use axum::extract::{Path as UrlPath, Query, State};
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use comicdb_ingest::config::IngestConfig;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Local stand-in for an image CDN
pub struct ImageServer {
    pub base_url: String,
    hits: Arc<AtomicUsize>,
}

impl ImageServer {
    /// Requests received so far
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// URL of an image that downloads successfully
    pub fn image(&self, name: &str) -> String {
        format!("{}/img/{}", self.base_url, name)
    }

    /// Page URL that differs from its siblings only by query string
    pub fn page(&self, n: u32) -> String {
        format!("{}/page?n={}", self.base_url, n)
    }

    /// URL that always answers 404
    pub fn missing(&self, name: &str) -> String {
        format!("{}/missing/{}", self.base_url, name)
    }

    /// URL that answers 200 with an empty body
    pub fn empty(&self, name: &str) -> String {
        format!("{}/empty/{}", self.base_url, name)
    }
}

async fn serve_image(State(hits): State<Arc<AtomicUsize>>, UrlPath(name): UrlPath<String>) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    (
        [(header::CONTENT_TYPE, "image/jpeg")],
        format!("image-bytes:{}", name).into_bytes(),
    )
}

async fn serve_page(
    State(hits): State<Arc<AtomicUsize>>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    hits.fetch_add(1, Ordering::SeqCst);
    let n = params.get("n").cloned().unwrap_or_default();
    ([(header::CONTENT_TYPE, "image/jpeg")], format!("page-{}", n).into_bytes())
}

async fn serve_missing(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
    hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND
}

async fn serve_empty(State(hits): State<Arc<AtomicUsize>>) -> Vec<u8> {
    hits.fetch_add(1, Ordering::SeqCst);
    Vec::new()
}

/// Start an image server on an ephemeral port
pub async fn start_image_server() -> ImageServer {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/img/:name", get(serve_image))
        .route("/page", get(serve_page))
        .route("/missing/:name", get(serve_missing))
        .route("/empty/:name", get(serve_empty))
        .with_state(Arc::clone(&hits));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test server");
    let addr = listener.local_addr().expect("No local address");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Test server failed");
    });

    ImageServer {
        base_url: format!("http://{}", addr),
        hits,
    }
}

/// Write a JSON document and return its path
pub fn write_json(dir: &Path, name: &str, value: &Value) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create fixture directory");
    }
    std::fs::write(&path, serde_json::to_string_pretty(value).expect("Invalid fixture"))
        .expect("Failed to write fixture");
    path
}

/// Config rooted in `root` with fast retries
pub fn test_config(root: &Path) -> IngestConfig {
    let mut config = IngestConfig::with_root(root);
    config.images.max_retries = 2;
    config.images.retry_base_delay_ms = 1;
    config.images.timeout_ms = 5_000;
    config
}

/// Row count of a table
pub async fn count_rows(pool: &sqlx::SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("Count query failed")
}
