//! Assembled retrieval context handed to the answer generator

use serde::{Deserialize, Serialize};

use super::query::RetrievalResult;
use crate::generation::prompt::PromptBuilder;

/// Token-budgeted, citation-annotated context
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RagContext {
    /// Selected results in score order
    pub results: Vec<RetrievalResult>,
    /// Contributing document names, in first-seen order
    pub sources: Vec<String>,
    /// Sum of the selected chunks' token estimates
    pub total_tokens: usize,
    /// Prompt-ready context string
    pub formatted: String,
}

impl RagContext {
    /// Empty, well-formed context
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a context from already-selected results
    pub fn from_results(results: Vec<RetrievalResult>) -> Self {
        let total_tokens = results.iter().map(|r| r.chunk.token_count).sum();
        let sources = collect_sources(&results);
        let formatted = PromptBuilder::build_context(&results);

        Self {
            results,
            sources,
            total_tokens,
            formatted,
        }
    }

    /// Greedily select results in score order while the token budget holds,
    /// stopping after `top_k` results
    pub fn within_budget(results: Vec<RetrievalResult>, max_tokens: usize, top_k: usize) -> Self {
        let mut selected = Vec::new();
        let mut total = 0usize;

        for result in results {
            if selected.len() >= top_k {
                break;
            }
            if total + result.chunk.token_count > max_tokens {
                break;
            }
            total += result.chunk.token_count;
            selected.push(result);
        }

        Self::from_results(selected)
    }

    /// Whether no results were selected
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Whether any selected chunk contains `needle` (case-insensitive)
    pub fn contains_text(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.results
            .iter()
            .any(|r| r.chunk.content.to_lowercase().contains(&needle))
    }
}

/// Unique document names in first-seen order
pub fn collect_sources(results: &[RetrievalResult]) -> Vec<String> {
    let mut sources: Vec<String> = Vec::new();
    for result in results {
        let name = &result.chunk.source.document_name;
        if !sources.iter().any(|s| s == name) {
            sources.push(name.clone());
        }
    }
    sources
}
