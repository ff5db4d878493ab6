//! Destination naming for cached images

use sha2::{Digest, Sha256};
use std::path::PathBuf;

const DEFAULT_EXTENSION: &str = "jpg";

/// Hex digits of the URL digest used to tell names apart
const SUFFIX_LEN: usize = 12;

/// Filename from the URL's final path segment
///
/// A URL with a query string gets a short digest of the full URL before the
/// extension, so `page?n=1` and `page?n=2` land in different files. A URL
/// with no usable segment is named `image-<digest>`. Names without an
/// extension get `.jpg`. The same URL always yields the same name.
pub fn derive_filename(url: &str) -> String {
    let parsed = reqwest::Url::parse(url).ok();
    let segment = parsed
        .as_ref()
        .and_then(|parsed| parsed.path_segments())
        .and_then(|mut segments| segments.next_back().map(sanitize))
        .unwrap_or_default();
    let has_query = parsed
        .as_ref()
        .and_then(|parsed| parsed.query())
        .is_some_and(|query| !query.is_empty());

    if segment.trim_matches('.').is_empty() {
        return format!("image-{}.{}", url_digest(url), DEFAULT_EXTENSION);
    }

    let (stem, extension) = match segment.rsplit_once('.') {
        Some((stem, extension)) if has_extension(&segment) => (stem, extension),
        _ => (segment.as_str(), DEFAULT_EXTENSION),
    };

    if has_query {
        format!("{}-{}.{}", stem, url_digest(url), extension)
    } else {
        format!("{}.{}", stem, extension)
    }
}

/// Leading hex digits of the URL's SHA-256
fn url_digest(url: &str) -> String {
    let mut hex = format!("{:x}", Sha256::digest(url.as_bytes()));
    hex.truncate(SUFFIX_LEN);
    hex
}

fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect()
}

fn has_extension(name: &str) -> bool {
    match name.rsplit_once('.') {
        Some((stem, ext)) => {
            !stem.is_empty() && (1..=5).contains(&ext.len()) && ext.chars().all(|c| c.is_ascii_alphanumeric())
        }
        None => false,
    }
}

/// Relative directory for a namespace; empty, `.` and `..` components are
/// dropped so a namespace never escapes the image root
pub fn namespace_dir(namespace: &str) -> PathBuf {
    namespace
        .split(['/', '\\'])
        .map(str::trim)
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .collect()
}

/// Relative stored path (`namespace/filename`, forward slashes)
pub fn relative_path(namespace: &str, filename: &str) -> String {
    let dir = namespace_dir(namespace);
    let mut parts: Vec<String> = dir
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    parts.push(filename.to_string());
    parts.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filename_from_last_segment() {
        assert_eq!(derive_filename("https://cdn.example/covers/one-piece.png"), "one-piece.png");
        assert_eq!(derive_filename("https://cdn.example/work/123/cover.jpg"), "cover.jpg");
    }

    #[test]
    fn test_filename_gets_default_extension() {
        assert_eq!(derive_filename("https://cdn.example/img/12345"), "12345.jpg");
        assert_eq!(derive_filename("https://cdn.example/img/page.final-version"), "page.final-version.jpg");
    }

    #[test]
    fn test_query_string_gives_distinct_stable_names() {
        let first = derive_filename("https://cdn.example/page?n=1");
        let second = derive_filename("https://cdn.example/page?n=2");

        assert_ne!(first, second);
        assert_eq!(first, derive_filename("https://cdn.example/page?n=1"));
        assert!(first.starts_with("page-"), "{}", first);
        assert!(first.ends_with(".jpg"), "{}", first);
        assert_eq!(first.len(), "page-.jpg".len() + SUFFIX_LEN);

        let webp = derive_filename("https://cdn.example/p/001.webp?w=800");
        assert!(webp.starts_with("001-") && webp.ends_with(".webp"), "{}", webp);
    }

    #[test]
    fn test_filename_fallback_when_no_segment() {
        let name = derive_filename("https://cdn.example/");
        assert!(name.starts_with("image-"));
        assert!(name.ends_with(".jpg"));
        assert_eq!(name, derive_filename("https://cdn.example/"));
        assert_ne!(name, derive_filename("https://other.example/"));
    }

    #[test]
    fn test_namespace_cannot_escape_root() {
        assert_eq!(namespace_dir("../../etc/./covers"), PathBuf::from("etc/covers"));
        assert_eq!(relative_path("work/123/", "cover.jpg"), "work/123/cover.jpg");
        assert_eq!(relative_path("", "cover.jpg"), "cover.jpg");
    }
}
