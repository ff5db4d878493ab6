//! The seven cascade stages
//!
//! Each matcher sees the raw parent reference and the index, and either
//! names one parent or passes.

use super::fuzzy::fuzzy_normalize;
use super::index::{ParentEntry, ParentIndex};
use super::levenshtein::levenshtein;
use crate::config::ResolutionSettings;
use crate::models::ParentRef;
use crate::text::{lower_trim, slugify, title_key};

/// Stage signature
pub type Matcher = for<'a> fn(&ParentRef, &'a ParentIndex, &ResolutionSettings) -> Option<&'a ParentEntry>;

/// Stage 1: the slug as given
pub fn exact_slug<'a>(
    parent: &ParentRef,
    index: &'a ParentIndex,
    _: &ResolutionSettings,
) -> Option<&'a ParentEntry> {
    index.by_slug(parent.slug_candidate()?)
}

/// Stage 2: the slug re-normalized
pub fn normalized_slug<'a>(
    parent: &ParentRef,
    index: &'a ParentIndex,
    _: &ResolutionSettings,
) -> Option<&'a ParentEntry> {
    let slug = slugify(parent.slug_candidate()?);
    if slug.is_empty() {
        return None;
    }
    index.by_normalized_slug(&slug)
}

/// Prefix, suffix or containment in either direction
fn overlaps(candidate: &str, known: &str) -> bool {
    !candidate.is_empty()
        && !known.is_empty()
        && (known.starts_with(candidate)
            || known.ends_with(candidate)
            || known.contains(candidate)
            || candidate.contains(known))
}

/// Stage 3: raw candidate against every known normalized slug
pub fn substring_slug<'a>(
    parent: &ParentRef,
    index: &'a ParentIndex,
    _: &ResolutionSettings,
) -> Option<&'a ParentEntry> {
    let candidate = lower_trim(parent.slug_candidate()?);
    index
        .entries()
        .iter()
        .find(|entry| overlaps(&candidate, &entry.normalized_slug))
}

/// Stage 4: title with punctuation stripped, then raw lowercase title
pub fn title<'a>(
    parent: &ParentRef,
    index: &'a ParentIndex,
    _: &ResolutionSettings,
) -> Option<&'a ParentEntry> {
    let candidate = parent.title_candidate()?;
    let key = title_key(candidate);

    (!key.is_empty())
        .then(|| index.by_title_key(&key))
        .flatten()
        .or_else(|| index.by_title_lower(&lower_trim(candidate)))
}

/// Segment following the first marker segment of a URL path
pub fn url_slug(url: &str, markers: &[String]) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let segments: Vec<&str> = parsed.path_segments()?.filter(|s| !s.is_empty()).collect();

    segments
        .iter()
        .position(|segment| markers.iter().any(|m| m.eq_ignore_ascii_case(segment)))
        .and_then(|i| segments.get(i + 1))
        .map(|segment| segment.to_string())
}

/// Stage 5: slug embedded in the source URL, looked up as in stage 2
pub fn url_derived<'a>(
    parent: &ParentRef,
    index: &'a ParentIndex,
    settings: &ResolutionSettings,
) -> Option<&'a ParentEntry> {
    let segment = url_slug(parent.url.as_deref()?, &settings.url_markers)?;
    let slug = slugify(&segment);
    if slug.is_empty() {
        return None;
    }
    index.by_normalized_slug(&slug)
}

/// Stage 6: raw candidate against every known slug and title
pub fn aggressive_scan<'a>(
    parent: &ParentRef,
    index: &'a ParentIndex,
    _: &ResolutionSettings,
) -> Option<&'a ParentEntry> {
    let candidate = lower_trim(parent.slug_candidate()?);
    index.entries().iter().find(|entry| {
        overlaps(&candidate, &entry.normalized_slug) || overlaps(&candidate, &entry.normalized_title)
    })
}

/// Stage 7: closest parent by edit distance on fuzzy-normalized text
pub fn fuzzy<'a>(
    parent: &ParentRef,
    index: &'a ParentIndex,
    settings: &ResolutionSettings,
) -> Option<&'a ParentEntry> {
    let candidate = fuzzy_normalize(parent.slug_candidate()?);
    if candidate.is_empty() {
        return None;
    }

    let mut best: Option<(&ParentEntry, usize)> = None;
    for entry in index.entries() {
        let distance = levenshtein(&candidate, entry.fuzzy_target());
        // Strictly closer only: ties keep the earlier parent
        if best.map(|(_, d)| distance < d).unwrap_or(true) {
            best = Some((entry, distance));
        }
    }

    let (entry, distance) = best?;
    let candidate_len = candidate.chars().count();
    let best_len = entry.fuzzy_target().chars().count();

    let strict = settings
        .strict_floor
        .max((settings.strict_ratio * candidate_len.min(best_len) as f64).floor() as usize);
    let loose = settings
        .loose_floor
        .max((settings.loose_ratio * candidate_len as f64).floor() as usize);

    (distance <= strict || distance < loose).then_some(entry)
}
