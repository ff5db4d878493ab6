//! Image acquisition against a local HTTP server

mod helpers;

use comicdb_ingest::images::{ImageCache, ImageOrigin, ImageRequest};
use helpers::{start_image_server, test_config};

#[tokio::test]
async fn test_second_acquire_is_cache_hit_without_request() {
    let server = start_image_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ImageCache::new(config.image_root.clone(), &config.images, false).unwrap();

    let url = server.image("cover.png");
    let first = cache.acquire(&url, "covers/one-piece").await.unwrap();
    let second = cache.acquire(&url, "covers/one-piece").await.unwrap();

    assert_eq!(first.origin, ImageOrigin::Fresh);
    assert_eq!(second.origin, ImageOrigin::Cache);
    assert_eq!(first.relative_path, "covers/one-piece/cover.png");
    assert_eq!(std::fs::read(&first.local_path).unwrap(), b"image-bytes:cover.png");
    assert_eq!(server.hits(), 1);
    assert_eq!(cache.requests_issued(), 1);
}

#[tokio::test]
async fn test_file_from_previous_run_is_reused() {
    let server = start_image_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let url = server.image("page-1.jpg");

    let first_run = ImageCache::new(config.image_root.clone(), &config.images, false).unwrap();
    first_run.acquire(&url, "chapters/bleach/1").await.unwrap();

    let second_run = ImageCache::new(config.image_root.clone(), &config.images, false).unwrap();
    let image = second_run.acquire(&url, "chapters/bleach/1").await.unwrap();

    assert_eq!(image.origin, ImageOrigin::Cache);
    assert_eq!(server.hits(), 1);
    assert_eq!(second_run.requests_issued(), 0);
}

#[tokio::test]
async fn test_batch_preserves_order_and_deduplicates() {
    let server = start_image_server().await;
    let dir = tempfile::tempdir().unwrap();
    let mut config = test_config(dir.path());
    config.images.concurrency = 2;
    let cache = ImageCache::new(config.image_root.clone(), &config.images, false).unwrap();

    let namespace = "chapters/naruto/7";
    let requests: Vec<ImageRequest> = ["p1.jpg", "p2.jpg", "p1.jpg", "p3.jpg"]
        .iter()
        .map(|name| ImageRequest::new(server.image(name), namespace))
        .collect();

    let results = cache.acquire_batch(&requests).await;

    assert_eq!(results.len(), 4);
    let paths: Vec<String> = results
        .iter()
        .map(|r| r.as_ref().unwrap().relative_path.clone())
        .collect();
    assert_eq!(
        paths,
        vec![
            "chapters/naruto/7/p1.jpg",
            "chapters/naruto/7/p2.jpg",
            "chapters/naruto/7/p1.jpg",
            "chapters/naruto/7/p3.jpg",
        ]
    );
    assert_eq!(results[0].as_ref().unwrap().origin, ImageOrigin::Fresh);
    assert_eq!(results[2].as_ref().unwrap().origin, ImageOrigin::Cache);
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn test_urls_differing_only_by_query_get_their_own_files() {
    let server = start_image_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ImageCache::new(config.image_root.clone(), &config.images, false).unwrap();

    let requests: Vec<ImageRequest> = (1..=3)
        .map(|n| ImageRequest::new(server.page(n), "chapters/x/1"))
        .collect();

    let results = cache.acquire_batch(&requests).await;

    let images: Vec<_> = results.into_iter().map(Result::unwrap).collect();
    for (n, image) in (1..=3).zip(&images) {
        assert_eq!(image.origin, ImageOrigin::Fresh);
        assert!(image.relative_path.starts_with("chapters/x/1/page-"), "{}", image.relative_path);
        assert_eq!(std::fs::read_to_string(&image.local_path).unwrap(), format!("page-{}", n));
    }
    assert_ne!(images[0].relative_path, images[1].relative_path);
    assert_ne!(images[1].relative_path, images[2].relative_path);
    assert_ne!(images[0].relative_path, images[2].relative_path);
    assert_eq!(server.hits(), 3);
    assert_eq!(cache.requests_issued(), 3);

    // A later run finds each page under the same name
    let next_run = ImageCache::new(config.image_root.clone(), &config.images, false).unwrap();
    let again = next_run.acquire(&server.page(2), "chapters/x/1").await.unwrap();
    assert_eq!(again.origin, ImageOrigin::Cache);
    assert_eq!(again.relative_path, images[1].relative_path);
    assert_eq!(server.hits(), 3);
}

#[tokio::test]
async fn test_not_found_exhausts_retries() {
    let server = start_image_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ImageCache::new(config.image_root.clone(), &config.images, false).unwrap();

    let err = cache
        .acquire(&server.missing("gone.jpg"), "covers/gone")
        .await
        .unwrap_err();

    assert_eq!(err.attempts, config.images.max_retries);
    assert!(err.message.contains("404"), "unexpected message: {}", err.message);
    assert_eq!(server.hits(), config.images.max_retries as usize);
    assert!(!config.image_root.join("covers/gone/gone.jpg").exists());
}

#[tokio::test]
async fn test_failed_url_is_not_retried_within_a_run() {
    let server = start_image_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ImageCache::new(config.image_root.clone(), &config.images, false).unwrap();
    let url = server.missing("shared-cover.jpg");

    let first = cache.acquire(&url, "covers/a").await.unwrap_err();
    let second = cache.acquire(&url, "covers/b").await.unwrap_err();
    let batch = cache
        .acquire_batch(&[ImageRequest::new(url.clone(), "covers/c"), ImageRequest::new(url.clone(), "covers/d")])
        .await;

    assert_eq!(first, second);
    assert!(batch.iter().all(|r| r.as_ref().unwrap_err() == &first));
    assert_eq!(server.hits(), config.images.max_retries as usize);
    assert_eq!(cache.requests_issued(), u64::from(config.images.max_retries));
}

#[tokio::test]
async fn test_empty_body_is_a_failure_and_leaves_no_partial_file() {
    let server = start_image_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ImageCache::new(config.image_root.clone(), &config.images, false).unwrap();

    let result = cache.acquire(&server.empty("blank.jpg"), "covers/blank").await;

    assert!(result.is_err());
    let folder = config.image_root.join("covers").join("blank");
    let leftovers: Vec<_> = std::fs::read_dir(&folder)
        .map(|entries| entries.filter_map(Result::ok).map(|e| e.file_name()).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "left behind: {:?}", leftovers);
}

#[tokio::test]
async fn test_dry_run_plans_without_network_or_files() {
    let server = start_image_server().await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(dir.path());
    let cache = ImageCache::new(config.image_root.clone(), &config.images, true).unwrap();

    let image = cache.acquire(&server.image("a.jpg"), "covers/a").await.unwrap();

    assert_eq!(image.origin, ImageOrigin::Planned);
    assert_eq!(server.hits(), 0);
    assert!(!image.local_path.exists());
}
