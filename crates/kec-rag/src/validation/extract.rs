//! Claim extraction from generated answers

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::domain::codes::extract_codes;
use crate::domain::DomainTables;
use crate::error::{Error, Result};

/// Longest accepted claim entry (chars)
const MAX_CLAIM_CHARS: usize = 200;

const MAX_FORMULAS: usize = 10;

/// Code citation with an optional bracketed topic label
static CODE_CITATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(KEC\s*)?(\d{3}(?:\.\d{1,2}){0,4})(\s*(?:\([^()]{1,30}\)|\[[^\[\]]{1,30}\]))?")
        .expect("valid regex")
});

static QUOTED_TERM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["“'‘「]([^"”'’」\n]{2,30})["”'’」]"#).expect("valid regex"));

static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s*").expect("valid regex"));

/// Candidate claims found in an answer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AnswerClaims {
    /// Domain terms
    pub terms: Vec<String>,
    /// Code citations as written, e.g. "KEC 230 (조명)"
    pub codes: Vec<String>,
    /// Formula lines
    pub formulas: Vec<String>,
}

impl AnswerClaims {
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty() && self.codes.is_empty() && self.formulas.is_empty()
    }

    /// Trimmed copy; rejects empty or oversized entries
    pub fn sanitized(&self) -> Result<Self> {
        Ok(Self {
            terms: sanitize("term", &self.terms)?,
            codes: sanitize("code", &self.codes)?,
            formulas: sanitize("formula", &self.formulas)?,
        })
    }
}

fn sanitize(kind: &str, entries: &[String]) -> Result<Vec<String>> {
    let mut cleaned: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry.trim();
        if entry.is_empty() {
            return Err(Error::validation(format!("empty {} claim", kind)));
        }
        if entry.chars().count() > MAX_CLAIM_CHARS {
            return Err(Error::validation(format!(
                "{} claim longer than {} chars",
                kind, MAX_CLAIM_CHARS
            )));
        }
        if !cleaned.iter().any(|e| e == entry) {
            cleaned.push(entry.to_string());
        }
    }
    Ok(cleaned)
}

/// Pattern-based extractor for terms, code citations and formulas
pub struct ClaimExtractor {
    tables: Arc<DomainTables>,
    max_terms: usize,
}

impl ClaimExtractor {
    pub fn new(tables: Arc<DomainTables>, max_terms: usize) -> Self {
        Self { tables, max_terms }
    }

    pub fn extract(&self, answer: &str) -> AnswerClaims {
        AnswerClaims {
            terms: self.terms(answer),
            codes: code_citations(answer),
            formulas: formulas(answer),
        }
    }

    /// Vocabulary terms first, then quoted terms
    fn terms(&self, answer: &str) -> Vec<String> {
        let mut terms = self.tables.keywords_in(answer, self.max_terms);

        for caps in QUOTED_TERM.captures_iter(answer) {
            if terms.len() >= self.max_terms {
                break;
            }
            let quoted = caps[1].trim();
            if !quoted.is_empty() && !terms.iter().any(|t| t == quoted) {
                terms.push(quoted.to_string());
            }
        }

        terms
    }
}

/// Code citations: dotted numbers or "KEC"-marked families, with any
/// trailing topic label kept
pub fn code_citations(answer: &str) -> Vec<String> {
    let codes = extract_codes(answer);
    let mut citations: Vec<String> = Vec::new();

    for caps in CODE_CITATION.captures_iter(answer) {
        let code = &caps[2];
        let marked = caps.get(1).is_some();
        if !(marked || code.contains('.')) || !codes.iter().any(|c| c == code) {
            continue;
        }

        let citation = caps[0].trim().to_string();
        if !citations.contains(&citation) {
            citations.push(citation);
        }
    }

    citations
}

/// Lines carrying an assignment-style '='
pub fn formulas(answer: &str) -> Vec<String> {
    answer
        .lines()
        .filter(|line| line.contains('=') && !line.contains("=="))
        .map(|line| LIST_MARKER.replace(line, "").trim().to_string())
        .filter(|line| !line.is_empty())
        .take(MAX_FORMULAS)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::tables;

    const ANSWER: &str = "KEC 142.6 (공통접지)에 따라 등전위본딩을 한다. 접지저항은 \"접지극 형상\"에 좌우된다.\n\
        - Qc = P(tanθ1 - tanθ2)\n\
        역률 0.85는 코드가 아니며 KEC 230 [조명]도 참고한다. 232.5 규정을 보라.";

    #[test]
    fn test_extracts_codes_with_labels() {
        assert_eq!(
            code_citations(ANSWER),
            vec!["KEC 142.6 (공통접지)", "KEC 230 [조명]", "232.5"]
        );
    }

    #[test]
    fn test_bare_family_not_a_citation() {
        assert!(code_citations("전압 230 V 회로").is_empty());
    }

    #[test]
    fn test_extracts_formulas() {
        assert_eq!(formulas(ANSWER), vec!["Qc = P(tanθ1 - tanθ2)"]);
        assert!(formulas("if a == b").is_empty());
    }

    #[test]
    fn test_extracts_terms() {
        let extractor = ClaimExtractor::new(tables(), 10);
        let claims = extractor.extract(ANSWER);

        assert!(claims.terms.iter().any(|t| t == "등전위본딩"));
        assert!(claims.terms.iter().any(|t| t == "접지극 형상"));
        assert!(claims.terms.len() <= 10);
    }

    #[test]
    fn test_term_cap() {
        let extractor = ClaimExtractor::new(tables(), 2);
        assert_eq!(extractor.extract(ANSWER).terms.len(), 2);
    }

    #[test]
    fn test_sanitize_rejects_bad_shapes() {
        let claims = AnswerClaims {
            terms: vec!["  ".to_string()],
            ..Default::default()
        };
        assert!(matches!(claims.sanitized(), Err(Error::Validation(_))));

        let claims = AnswerClaims {
            formulas: vec!["x".repeat(201)],
            ..Default::default()
        };
        assert!(claims.sanitized().is_err());

        let claims = AnswerClaims {
            codes: vec![" 230.2 ".to_string(), "230.2".to_string()],
            ..Default::default()
        };
        assert_eq!(claims.sanitized().unwrap().codes, vec!["230.2"]);
    }
}
