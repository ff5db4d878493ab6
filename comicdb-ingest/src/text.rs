//! Text keys shared by the loader and the resolution engine

/// Slug form: lowercase, runs of non-alphanumerics collapsed to one hyphen,
/// no leading or trailing hyphen
pub fn slugify(input: &str) -> String {
    let mut slug = String::with_capacity(input.len());
    let mut pending_hyphen = false;

    for c in input.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_hyphen && !slug.is_empty() {
                slug.push('-');
            }
            pending_hyphen = false;
            slug.push(c);
        } else {
            pending_hyphen = true;
        }
    }

    slug
}

/// Title key: alphanumerics only, case folded
pub fn title_key(input: &str) -> String {
    input
        .chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Raw-lowercase-trimmed form
pub fn lower_trim(input: &str) -> String {
    input.trim().to_lowercase()
}
