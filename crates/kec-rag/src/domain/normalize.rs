//! Query normalization: unit words to SI symbols, common domain typos,
//! abbreviation cleanup and whitespace collapsing

use once_cell::sync::Lazy;
use regex::Regex;

use super::tables::{DomainTables, Replacement};

static POWER_FACTOR_ABBR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bpf\s*=?\s*(\d)").expect("valid regex"));

static COSINE_ABBR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bcos\s*=?\s*(\d)").expect("valid regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Rewrites queries into the corpus' canonical spelling
#[derive(Debug, Clone, Default)]
pub struct QueryNormalizer {
    rules: Vec<Replacement>,
}

impl QueryNormalizer {
    /// Build from the unit and typo tables (units first)
    pub fn new(tables: &DomainTables) -> Self {
        let rules = tables
            .unit_aliases
            .iter()
            .chain(tables.typo_corrections.iter())
            .filter(|r| !r.from.is_empty())
            .cloned()
            .collect();
        Self { rules }
    }

    /// Normalize a query
    pub fn normalize(&self, text: &str) -> String {
        let mut normalized = text.trim().to_string();

        for rule in &self.rules {
            if normalized.contains(&rule.from) {
                normalized = normalized.replace(&rule.from, &rule.to);
            }
        }

        let normalized = POWER_FACTOR_ABBR.replace_all(&normalized, "역률 $1");
        let normalized = COSINE_ABBR.replace_all(&normalized, "cosθ = $1");

        WHITESPACE.replace_all(&normalized, " ").trim().to_string()
    }
}
