//! Shape normalization for heterogeneous field values
//!
//! A scraped field may hold a string, a number, an object, or an array of
//! any of those. These helpers collapse such values into plain Rust types
//! before schema validation runs.

use serde_json::{Map, Value};

/// Sub-keys tried, in order, when collapsing an object to a string
const REFERENCE_KEYS: [&str; 6] = ["name", "fullName", "full_name", "title", "slug", "id"];

/// Wrapper objects searched one level deep
const WRAPPER_KEYS: [&str; 2] = ["person", "attributes"];

/// Sub-keys tried when collapsing an object to a URL
const URL_KEYS: [&str; 7] = ["url", "src", "href", "original", "large", "medium", "small"];

/// First non-null value among `aliases`
pub fn field<'a>(fields: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|key| fields.get(*key))
        .find(|value| !value.is_null())
}

/// Non-empty trimmed string for strings and numbers
fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn collapse_object(object: &Map<String, Value>) -> Option<String> {
    REFERENCE_KEYS
        .iter()
        .filter_map(|key| object.get(*key))
        .find_map(scalar_string)
}

/// Collapse a string / object / array-of-either into one string
///
/// Arrays yield their first element that collapses to something.
pub fn collapse_reference(value: &Value) -> Option<String> {
    match value {
        Value::String(_) | Value::Number(_) => scalar_string(value),
        Value::Array(items) => items.iter().find_map(collapse_reference),
        Value::Object(object) => collapse_object(object).or_else(|| {
            WRAPPER_KEYS
                .iter()
                .filter_map(|key| object.get(*key))
                .filter_map(Value::as_object)
                .find_map(collapse_object)
        }),
        _ => None,
    }
}

/// Collapse a genre field into a trimmed, deduplicated, ordered list
///
/// Accepts a comma-separated string, or an array of strings/objects.
/// Duplicates are detected case-insensitively; the first spelling wins.
pub fn collapse_genres(value: &Value) -> Vec<String> {
    let mut raw = Vec::new();
    match value {
        Value::String(s) => raw.extend(s.split(',').map(str::to_string)),
        Value::Array(items) => {
            for item in items {
                match item {
                    Value::String(s) => raw.extend(s.split(',').map(str::to_string)),
                    other => raw.extend(collapse_reference(other)),
                }
            }
        }
        Value::Object(_) => raw.extend(collapse_reference(value)),
        _ => {}
    }

    let mut seen = std::collections::HashSet::new();
    raw.into_iter()
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .filter(|g| seen.insert(g.to_lowercase()))
        .collect()
}

fn is_http_url(candidate: &str) -> bool {
    let lower = candidate.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Collapse a URL-ish value (string, `{url|src|...}` object, or array)
/// into one http(s) URL
pub fn collapse_url(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            is_http_url(trimmed).then(|| trimmed.to_string())
        }
        Value::Array(items) => items.iter().find_map(collapse_url),
        Value::Object(object) => URL_KEYS
            .iter()
            .filter_map(|key| object.get(*key))
            .find_map(collapse_url),
        _ => None,
    }
}

/// Ordered list of http(s) URLs; entries that are not URLs are dropped
pub fn collapse_url_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(collapse_url).collect(),
        other => collapse_url(other).into_iter().collect(),
    }
}

/// Sequence number from a number or from the first decimal in a string
/// ("Chapter 12.5" → 12.5)
pub fn parse_sequence_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => first_decimal(s),
        Value::Array(items) => items.first().and_then(parse_sequence_number),
        Value::Object(object) => object
            .get("number")
            .or_else(|| object.get("value"))
            .and_then(parse_sequence_number),
        _ => None,
    }
}

fn first_decimal(text: &str) -> Option<f64> {
    let start = text.find(|c: char| c.is_ascii_digit())?;
    let rest = &text[start..];

    let mut end = rest
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(rest.len());

    // Optional fractional part: ".<digits>"
    if rest[end..].starts_with('.') {
        let fraction = &rest[end + 1..];
        let digits = fraction
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(fraction.len());
        if digits > 0 {
            end += 1 + digits;
        }
    }

    rest[..end].parse().ok()
}

/// Integer year from a number or a date-ish string ("2019-04-01")
pub fn parse_year(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => {
            let digits: String = s
                .trim()
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        }
        _ => None,
    }
}

/// Float from a number or numeric string
pub fn parse_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Trimmed non-empty text from a scalar
pub fn text(value: &Value) -> Option<String> {
    scalar_string(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collapse_reference_shapes() {
        assert_eq!(collapse_reference(&json!("  Oda  ")), Some("Oda".to_string()));
        assert_eq!(collapse_reference(&json!({"fullName": "Eiichiro Oda"})), Some("Eiichiro Oda".to_string()));
        assert_eq!(
            collapse_reference(&json!([{"name": ""}, {"slug": "oda"}])),
            Some("oda".to_string())
        );
        assert_eq!(collapse_reference(&json!({"id": 42})), Some("42".to_string()));
        assert_eq!(collapse_reference(&json!(null)), None);
        assert_eq!(collapse_reference(&json!([])), None);
    }

    #[test]
    fn test_collapse_reference_priority_order() {
        let value = json!({"id": "7", "title": "Mr", "name": "Oda"});
        assert_eq!(collapse_reference(&value), Some("Oda".to_string()));
    }

    #[test]
    fn test_collapse_reference_one_wrapper_level() {
        let person = json!({"role": "story", "person": {"name": "Kishimoto"}});
        assert_eq!(collapse_reference(&person), Some("Kishimoto".to_string()));

        let attrs = json!({"attributes": {"fullName": "Toriyama"}});
        assert_eq!(collapse_reference(&attrs), Some("Toriyama".to_string()));

        // Only one level deep
        let deep = json!({"person": {"attributes": {"name": "Nobody"}}});
        assert_eq!(collapse_reference(&deep), None);
    }

    #[test]
    fn test_collapse_genres_comma_string() {
        assert_eq!(
            collapse_genres(&json!(" Action, Adventure ,, action ")),
            vec!["Action", "Adventure"]
        );
    }

    #[test]
    fn test_collapse_genres_mixed_array() {
        let value = json!(["Drama", {"name": "Comedy"}, {"title": "drama"}, "Romance, Comedy"]);
        assert_eq!(collapse_genres(&value), vec!["Drama", "Comedy", "Romance"]);
    }

    #[test]
    fn test_collapse_url_variants() {
        assert_eq!(
            collapse_url(&json!({"src": "https://cdn.example/a.png"})),
            Some("https://cdn.example/a.png".to_string())
        );
        assert_eq!(collapse_url(&json!("/relative/a.png")), None);
        assert_eq!(
            collapse_url_list(&json!(["https://x/1.jpg", "nope", {"url": "http://x/2.jpg"}])),
            vec!["https://x/1.jpg", "http://x/2.jpg"]
        );
    }

    #[test]
    fn test_parse_sequence_number() {
        assert_eq!(parse_sequence_number(&json!(12)), Some(12.0));
        assert_eq!(parse_sequence_number(&json!("Chapter 12.5: Fight")), Some(12.5));
        assert_eq!(parse_sequence_number(&json!("Ch. 7.")), Some(7.0));
        assert_eq!(parse_sequence_number(&json!("Prologue")), None);
    }

    #[test]
    fn test_parse_year() {
        assert_eq!(parse_year(&json!(1997)), Some(1997));
        assert_eq!(parse_year(&json!("1997-07-22")), Some(1997));
        assert_eq!(parse_year(&json!("unknown")), None);
    }
}
