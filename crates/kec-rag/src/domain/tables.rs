//! Versioned domain tables: synonyms, code keywords, topic profiles and
//! normalization rules

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::domain::codes::parent_code;
use crate::error::{Error, Result};

/// Built-in table set shipped with the crate
const BUILTIN_TABLES: &str = include_str!("../../data/domain_tables.toml");

/// A group of interchangeable domain terms
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynonymGroup {
    /// Term that triggers expansion when it appears in a query
    pub anchor: String,
    /// Terms appended to the query, in preference order
    pub terms: Vec<String>,
}

/// Retrieval profile for a downstream specialist
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicProfile {
    /// Token budget for the assembled context
    pub max_tokens: usize,
    /// Maximum number of chunks
    pub top_k: usize,
    /// Keywords appended to the query
    #[serde(default)]
    pub keywords: Vec<String>,
}

/// Plain string replacement rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replacement {
    pub from: String,
    pub to: String,
}

/// All domain tables
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainTables {
    /// Table version, logged when loaded
    pub version: String,
    #[serde(default)]
    pub si_units: Vec<String>,
    #[serde(default)]
    pub synonyms: Vec<SynonymGroup>,
    #[serde(default)]
    pub code_keywords: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub topics: HashMap<String, TopicProfile>,
    #[serde(default)]
    pub unit_aliases: Vec<Replacement>,
    #[serde(default)]
    pub typo_corrections: Vec<Replacement>,
    /// Every known domain term, longest first
    #[serde(skip)]
    vocabulary: Vec<String>,
}

impl DomainTables {
    /// Built-in tables
    pub fn builtin() -> Result<Self> {
        Self::from_toml_str(BUILTIN_TABLES)
    }

    /// Parse tables from TOML
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let tables: Self = toml::from_str(raw)?;
        tables.validate()?;
        Ok(tables.index())
    }

    /// Load tables from an override file, or the built-in set
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let tables = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)?;
                Self::from_toml_str(&raw)?
            }
            None => Self::builtin()?,
        };

        tracing::info!(
            "Domain tables {} loaded: {} synonym groups, {} code rows, {} topics",
            tables.version,
            tables.synonyms.len(),
            tables.code_keywords.len(),
            tables.topics.len()
        );

        Ok(tables)
    }

    fn validate(&self) -> Result<()> {
        for code in self.code_keywords.keys() {
            if !crate::domain::codes::is_valid_code(code) {
                return Err(Error::Config(format!("Invalid code in code_keywords: '{}'", code)));
            }
        }
        for (key, profile) in &self.topics {
            if profile.top_k == 0 || profile.max_tokens == 0 {
                return Err(Error::Config(format!("Topic '{}' needs non-zero top_k and max_tokens", key)));
            }
        }
        Ok(())
    }

    fn index(mut self) -> Self {
        let mut vocabulary: Vec<String> = Vec::new();
        let terms = self
            .synonyms
            .iter()
            .flat_map(|g| std::iter::once(&g.anchor).chain(g.terms.iter()))
            .chain(self.code_keywords.values().flatten())
            .chain(self.topics.values().flat_map(|p| p.keywords.iter()));

        for term in terms {
            let term = term.trim();
            if term.chars().count() >= 2 && !vocabulary.iter().any(|t| t == term) {
                vocabulary.push(term.to_string());
            }
        }

        vocabulary.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
        self.vocabulary = vocabulary;
        self
    }

    /// Topic profile for a key
    pub fn topic_profile(&self, key: &str) -> Option<&TopicProfile> {
        self.topics.get(key)
    }

    /// Keywords for a code, walking up parent codes until a row matches
    pub fn code_keywords_for(&self, code: &str) -> &[String] {
        let mut current = Some(code.to_string());
        while let Some(candidate) = current {
            if let Some(keywords) = self.code_keywords.get(&candidate) {
                return keywords;
            }
            current = parent_code(&candidate);
        }
        &[]
    }

    /// Every known domain term, longest first
    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Domain terms that occur in `text`, longest first, at most `max`
    pub fn keywords_in(&self, text: &str, max: usize) -> Vec<String> {
        let lower = text.to_lowercase();
        self.vocabulary
            .iter()
            .filter(|term| lower.contains(&term.to_lowercase()))
            .take(max)
            .cloned()
            .collect()
    }

    /// Topic whose keywords occur most often in `text`
    pub fn infer_topic(&self, text: &str) -> Option<String> {
        let lower = text.to_lowercase();
        let mut best: Option<(&str, usize)> = None;

        let mut keys: Vec<&String> = self.topics.keys().collect();
        keys.sort();

        for key in keys {
            let hits = self.topics[key]
                .keywords
                .iter()
                .filter(|k| lower.contains(&k.to_lowercase()))
                .count();
            if hits > 0 && best.map_or(true, |(_, h)| hits > h) {
                best = Some((key.as_str(), hits));
            }
        }

        best.map(|(key, _)| key.to_string())
    }
}
