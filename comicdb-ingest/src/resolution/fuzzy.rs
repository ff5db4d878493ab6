//! Fuzzy normalization for free-text parent references
//!
//! Roman numerals become arabic, filler words are dropped, and the result
//! is re-normalized to slug form.

use crate::text::slugify;

/// Filler words removed token by token
const STOPWORDS: [&str; 12] = [
    "the", "a", "an", "of", "and", "to", "in", "on", "for", "with", "by", "from",
];

/// Sub-unit markers; each also swallows an immediately following number
const SUB_UNIT_MARKERS: [&str; 7] = ["chapter", "chap", "ch", "vol", "volume", "part", "pt"];

const ROMAN_VALUES: [(u32, &str); 13] = [
    (1000, "M"),
    (900, "CM"),
    (500, "D"),
    (400, "CD"),
    (100, "C"),
    (90, "XC"),
    (50, "L"),
    (40, "XL"),
    (10, "X"),
    (9, "IX"),
    (5, "V"),
    (4, "IV"),
    (1, "I"),
];

fn roman_digit(c: char) -> Option<u32> {
    match c.to_ascii_uppercase() {
        'I' => Some(1),
        'V' => Some(5),
        'X' => Some(10),
        'L' => Some(50),
        'C' => Some(100),
        'D' => Some(500),
        'M' => Some(1000),
        _ => None,
    }
}

/// Standard subtractive parse; `None` for tokens with non-roman letters
pub fn parse_roman(token: &str) -> Option<u32> {
    let digits: Vec<u32> = token.chars().map(roman_digit).collect::<Option<_>>()?;
    if digits.is_empty() {
        return None;
    }

    let mut total: i64 = 0;
    for (i, value) in digits.iter().enumerate() {
        match digits.get(i + 1) {
            Some(next) if next > value => total -= i64::from(*value),
            _ => total += i64::from(*value),
        }
    }

    u32::try_from(total).ok().filter(|v| *v > 0)
}

pub fn to_roman(mut value: u32) -> String {
    let mut out = String::new();
    for (amount, numeral) in ROMAN_VALUES {
        while value >= amount {
            out.push_str(numeral);
            value -= amount;
        }
    }
    out
}

/// Arabic rendering of a canonical roman numeral ("XIV" → 14); anything
/// else ("IIII", "IC", "mix-up") is `None`
pub fn roman_to_arabic(token: &str) -> Option<u32> {
    let value = parse_roman(token)?;
    (value < 4000 && to_roman(value).eq_ignore_ascii_case(token)).then_some(value)
}

fn is_numeric(token: &str) -> bool {
    token.starts_with(|c: char| c.is_ascii_digit()) && token.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// Free text → comparable slug
pub fn fuzzy_normalize(input: &str) -> String {
    let tokens: Vec<String> = input
        .split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty())
        .map(|t| match roman_to_arabic(t) {
            Some(value) => value.to_string(),
            None => t.to_lowercase(),
        })
        .collect();

    let mut kept = Vec::with_capacity(tokens.len());
    let mut iter = tokens.iter().peekable();
    while let Some(token) = iter.next() {
        if SUB_UNIT_MARKERS.contains(&token.as_str()) {
            if iter.peek().map(|next| is_numeric(next)).unwrap_or(false) {
                iter.next();
            }
            continue;
        }
        if STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        kept.push(token.as_str());
    }

    slugify(&kept.join(" "))
}
