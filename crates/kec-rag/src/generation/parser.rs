//! Resilient parsing of structured generator output.
//!
//! Generators wrap JSON in prose, code fences or labels. Strategies are tried
//! in a fixed order and the outcome records which one succeeded.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::validation::AnswerClaims;

static FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z]*\s*\n?(.*?)```").expect("valid regex"));

static LEADING_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:json|output|result|response|answer|응답|답변|결과)\s*[:：]\s*").expect("valid regex")
});

/// Extraction strategies, in the order they are tried
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseStrategy {
    /// Whole text is JSON
    DirectJson,
    /// JSON inside a ``` fence
    FencedBlock,
    /// JSON after a "JSON:" / "답변:" style label
    LabelStripped,
    /// First balanced region that parses; `[...]` only when no `{...}` exists
    BalancedScan,
}

impl ParseStrategy {
    pub const ORDER: [ParseStrategy; 4] = [
        Self::DirectJson,
        Self::FencedBlock,
        Self::LabelStripped,
        Self::BalancedScan,
    ];
}

/// Tagged parse result
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome<T> {
    Parsed { value: T, strategy: ParseStrategy },
    Failed { tried: Vec<ParseStrategy>, error: String },
}

impl<T> ParseOutcome<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Parsed { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Self::Parsed { .. })
    }
}

/// Parse `text` into `T`, trying each strategy in turn
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> ParseOutcome<T> {
    let mut tried = Vec::with_capacity(ParseStrategy::ORDER.len());
    let mut last_error = String::from("no JSON found");

    for strategy in ParseStrategy::ORDER {
        tried.push(strategy);
        match attempt::<T>(strategy, text) {
            Ok(value) => {
                tracing::debug!("Parsed generator output via {:?}", strategy);
                return ParseOutcome::Parsed { value, strategy };
            }
            Err(e) => last_error = e,
        }
    }

    tracing::warn!("Could not parse generator output: {}", last_error);
    ParseOutcome::Failed {
        tried,
        error: last_error,
    }
}

fn attempt<T: DeserializeOwned>(strategy: ParseStrategy, text: &str) -> Result<T, String> {
    match strategy {
        ParseStrategy::DirectJson => from_json(text.trim()),
        ParseStrategy::FencedBlock => {
            let mut error = String::from("no fenced block");
            for caps in FENCED_BLOCK.captures_iter(text) {
                match from_json(caps[1].trim()) {
                    Ok(value) => return Ok(value),
                    Err(e) => error = e,
                }
            }
            Err(error)
        }
        ParseStrategy::LabelStripped => {
            if !LEADING_LABEL.is_match(text) {
                return Err("no label".to_string());
            }
            from_json(LEADING_LABEL.replace_all(text, "").trim())
        }
        ParseStrategy::BalancedScan => {
            let regions = balanced_regions(text);
            // serde reads a bare array as a struct in field order, so arrays
            // are candidates only when the text holds no object at all
            let has_object = regions.iter().any(|r| r.starts_with('{'));

            let mut error = String::from("no balanced region");
            for region in regions.into_iter().filter(|r| !has_object || r.starts_with('{')) {
                match from_json(region) {
                    Ok(value) => return Ok(value),
                    Err(e) => error = e,
                }
            }
            Err(error)
        }
    }
}

fn from_json<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    serde_json::from_str(text).map_err(|e| e.to_string())
}

/// Balanced `{...}` / `[...]` regions, in order of their opening bracket.
///
/// Brackets inside double-quoted strings (with backslash escapes) do not count.
pub fn balanced_regions(text: &str) -> Vec<&str> {
    let mut regions = Vec::new();

    for (start, c) in text.char_indices() {
        if c != '{' && c != '[' {
            continue;
        }
        if let Some(end) = matching_close(text, start) {
            regions.push(&text[start..end]);
        }
    }

    regions
}

/// Byte offset just past the bracket closing the one at `start`
fn matching_close(text: &str, start: usize) -> Option<usize> {
    let mut expected: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' => expected.push('}'),
            '[' => expected.push(']'),
            '}' | ']' => {
                if expected.pop() != Some(c) {
                    return None;
                }
                if expected.is_empty() {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }

    None
}

/// One solution step: `{"title", "content"}` or plain text
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum AnswerStep {
    Titled { title: String, content: String },
    Text(String),
}

impl AnswerStep {
    pub fn text(&self) -> String {
        match self {
            Self::Titled { title, content } => format!("{}: {}", title, content),
            Self::Text(text) => text.clone(),
        }
    }
}

/// Canonical structured answer produced by a generator
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GeneratedAnswer {
    pub answer: String,
    #[serde(default)]
    pub steps: Vec<AnswerStep>,
    #[serde(default)]
    pub formulas: Vec<String>,
    #[serde(default, alias = "relatedCodes", alias = "relatedKEC", alias = "related_kec")]
    pub related_codes: Vec<String>,
    #[serde(default, alias = "keyTerms")]
    pub key_terms: Vec<String>,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl GeneratedAnswer {
    /// Pre-extracted claims for the validator
    pub fn into_claims(self) -> AnswerClaims {
        AnswerClaims {
            terms: self.key_terms,
            codes: self.related_codes,
            formulas: self.formulas,
        }
    }

    /// Answer text with its steps appended
    pub fn full_text(&self) -> String {
        if self.steps.is_empty() {
            self.answer.clone()
        } else {
            let steps: Vec<String> = self.steps.iter().map(AnswerStep::text).collect();
            format!("{}\n{}", self.answer, steps.join("\n"))
        }
    }
}
