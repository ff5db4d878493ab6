//! Levenshtein edit distance

/// Minimum number of single-character insertions, deletions and
/// substitutions turning `a` into `b` (unit costs)
///
/// The shorter input goes second: `strsim` sizes its rolling row by it.
pub fn levenshtein(a: &str, b: &str) -> usize {
    if a.chars().count() < b.chars().count() {
        strsim::levenshtein(b, a)
    } else {
        strsim::levenshtein(a, b)
    }
}
