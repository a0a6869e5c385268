//! Structured code grammar (dot-delimited regulatory clause numbers such as
//! "232.3.9")

use once_cell::sync::Lazy;
use regex::Regex;

/// Dotted clause numbers: three-digit family plus one or more sub-parts
static DOTTED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{3}(?:\.\d{1,2}){1,4}").expect("valid regex"));

/// Bare family numbers are only codes when explicitly marked
static MARKED_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)KEC\s*(\d{3}(?:\.\d{1,2}){0,4})").expect("valid regex"));

/// Anything code-shaped, used for query fallback
static LOOSE_CODE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{3}(?:\.\d{1,2}){0,4}").expect("valid regex"));

static FIRST_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+(?:\.\d+)*").expect("valid regex"));

static VALID_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)*$").expect("valid regex"));

static TOPIC_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(([^()]+)\)|\[([^\[\]]+)\]").expect("valid regex"));

/// True when `code` is digits with optional dot-separated digit sub-parts
pub fn is_valid_code(code: &str) -> bool {
    VALID_CODE.is_match(code)
}

/// Code with its last dot-segment removed ("232.3" -> "232")
pub fn parent_code(code: &str) -> Option<String> {
    code.rsplit_once('.').map(|(parent, _)| parent.to_string())
}

/// True when `candidate` sits strictly below `ancestor` ("142.6.1" under "142.6")
pub fn is_descendant(candidate: &str, ancestor: &str) -> bool {
    candidate.len() > ancestor.len()
        && candidate.starts_with(ancestor)
        && candidate.as_bytes()[ancestor.len()] == b'.'
}

/// First code-shaped token in a citation ("KEC 232.3조" -> "232.3")
pub fn normalize_code(raw: &str) -> Option<String> {
    FIRST_CODE
        .find(raw)
        .map(|m| m.as_str().trim_end_matches('.').to_string())
        .filter(|c| is_valid_code(c))
}

/// Bracketed or parenthesised topic label ("230 (조명)" -> "조명")
pub fn topic_label(citation: &str) -> Option<String> {
    TOPIC_LABEL.captures(citation).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// Structured codes in running text, de-duplicated in order of appearance.
///
/// Dotted numbers count when they are not part of a longer number; bare
/// three-digit families only when marked with "KEC".
pub fn extract_codes(text: &str) -> Vec<String> {
    let mut codes: Vec<(usize, String)> = Vec::new();

    for m in DOTTED_CODE.find_iter(text) {
        if standalone(text, m.start(), m.end()) {
            codes.push((m.start(), m.as_str().to_string()));
        }
    }

    for caps in MARKED_CODE.captures_iter(text) {
        if let Some(m) = caps.get(1) {
            if standalone(text, m.start(), m.end()) {
                codes.push((m.start(), m.as_str().to_string()));
            }
        }
    }

    codes.sort_by_key(|(pos, _)| *pos);
    let mut unique: Vec<String> = Vec::new();
    for (_, code) in codes {
        if !unique.contains(&code) {
            unique.push(code);
        }
    }
    unique
}

/// Code-like substrings of a free-text query, including bare families
pub fn code_like_substrings(query: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in LOOSE_CODE.find_iter(query) {
        if standalone(query, m.start(), m.end()) && !found.iter().any(|c| c == m.as_str()) {
            found.push(m.as_str().to_string());
        }
    }
    found
}

/// Match is not glued to surrounding digits, decimal parts or unit symbols
fn standalone(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    if matches!(before, Some(c) if c.is_ascii_digit() || c == '.') {
        return false;
    }

    let mut after = text[end..].chars();
    match after.next() {
        Some(c) if c.is_ascii_alphanumeric() => false,
        Some('.') => !matches!(after.next(), Some(c) if c.is_ascii_digit()),
        _ => true,
    }
}
