//! Configuration for the retrieval and validation engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::types::DocumentType;

/// Main engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Embedding configuration
    pub embeddings: EmbeddingConfig,
    /// Chunking configuration
    pub chunking: ChunkingConfig,
    /// Retrieval configuration
    pub retrieval: RetrievalConfig,
    /// Context assembly configuration
    pub context: ContextConfig,
    /// Answer validation configuration
    pub validation: ValidationConfig,
    /// Ollama configuration (embedding provider)
    pub llm: LlmConfig,
    /// Optional path to a domain table override file (TOML)
    pub domain_tables: Option<PathBuf>,
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Expected embedding dimensions (768 for nomic-embed-text)
    pub dimensions: usize,
    /// Maximum number of texts sent per provider batch
    pub max_batch_size: usize,
    /// Delay between provider calls inside a batch (milliseconds)
    pub batch_delay_ms: u64,
    /// Maximum number of cached vectors
    pub cache_capacity: usize,
    /// Prefix prepended to queries before embedding (e.g. "search_query: ")
    pub query_prefix: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimensions: 768,
            max_batch_size: 32,
            batch_delay_ms: 100,
            cache_capacity: 10_000,
            query_prefix: None,
        }
    }
}

/// Text chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in estimated tokens
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in estimated tokens
    pub chunk_overlap: usize,
    /// Chunk size used for oversized sections of regulation documents
    pub regulation_section_size: usize,
    /// Chunk size used for oversized sections of reference documents
    pub reference_section_size: usize,
    /// Chunk size used for oversized sections of formula sheets
    pub formula_section_size: usize,
    /// Tokens per character for CJK-heavy text
    pub cjk_token_ratio: f32,
    /// Characters per token for everything else
    pub chars_per_token: usize,
    /// Share of CJK characters above which text counts as CJK-heavy
    pub cjk_threshold: f32,
    /// Maximum keywords recorded per chunk
    pub max_keywords: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            regulation_section_size: 800,
            reference_section_size: 1000,
            formula_section_size: 600,
            cjk_token_ratio: 0.7,
            chars_per_token: 4,
            cjk_threshold: 0.3,
            max_keywords: 12,
        }
    }
}

impl ChunkingConfig {
    /// Chunk size for an oversized section of the given document type.
    ///
    /// Never smaller than the base chunk size.
    pub fn section_chunk_size(&self, doc_type: DocumentType) -> usize {
        let size = match doc_type {
            DocumentType::Regulation => self.regulation_section_size,
            DocumentType::Reference => self.reference_section_size,
            DocumentType::FormulaSheet => self.formula_section_size,
        };
        size.max(self.chunk_size)
    }
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Default number of results
    pub top_k: usize,
    /// Default minimum score
    pub min_score: f32,
    /// Weight of vector similarity in hybrid search (keyword gets the rest)
    pub semantic_weight: f32,
    /// Maximum synonyms appended per matching synonym group
    pub max_synonyms_per_group: usize,
    /// Reciprocal rank fusion constant
    pub rrf_k: f32,
    /// Candidate widening factor used by `build_context`
    pub context_candidate_factor: usize,
    /// Multiplier applied to `min_score` by `build_context`
    pub context_min_score_factor: f32,
    /// Apply unit and typo normalization before expansion
    pub normalize_queries: bool,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            min_score: 0.5,
            semantic_weight: 0.5,
            max_synonyms_per_group: 2,
            rrf_k: 60.0,
            context_candidate_factor: 3,
            context_min_score_factor: 0.6,
            normalize_queries: true,
        }
    }
}

/// Context assembly configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Token budget used when a topic key has no profile
    pub default_max_tokens: usize,
    /// Result count used when a topic key has no profile
    pub default_top_k: usize,
    /// Minimum score for agent context lookups
    pub min_score: f32,
    /// Profile keywords appended to agent queries
    pub max_profile_keywords: usize,
    /// Maximum results returned by code context
    pub code_context_limit: usize,
    /// Score multiplier for parent-code matches
    pub parent_code_decay: f32,
    /// Score multiplier for code-keyword matches
    pub code_keyword_decay: f32,
    /// Keyword lookups per code
    pub max_code_keywords: usize,
    /// Maximum terms looked up for verification
    pub max_verification_terms: usize,
    /// Token budget for term verification context
    pub term_context_max_tokens: usize,
    /// Minimum score for term verification lookups
    pub term_min_score: f32,
    /// Results per term lookup
    pub term_top_k: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            default_max_tokens: 2000,
            default_top_k: 5,
            min_score: 0.35,
            max_profile_keywords: 3,
            code_context_limit: 10,
            parent_code_decay: 0.8,
            code_keyword_decay: 0.7,
            max_code_keywords: 2,
            max_verification_terms: 8,
            term_context_max_tokens: 2500,
            term_min_score: 0.2,
            term_top_k: 3,
        }
    }
}

/// Answer validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Minimum top score for the exact code stage
    pub exact_min_score: f32,
    /// Score multiplier for the parent code stage
    pub parent_decay: f32,
    /// Score multiplier for the topic label stage
    pub topic_decay: f32,
    /// Score multiplier for the keyword stage
    pub keyword_decay: f32,
    /// Minimum score for free-text stage lookups
    pub stage_min_score: f32,
    /// Keywords used by the keyword stage
    pub max_stage_keywords: usize,
    /// Category weights for hallucination and confidence scoring
    pub weights: CategoryWeights,
    /// Answers at or above this hallucination score are invalid
    pub hallucination_threshold: f32,
    /// Minimum Jaccard similarity for a near-miss term suggestion
    pub similarity_threshold: f32,
    /// Maximum terms extracted from an answer
    pub max_terms: usize,
    /// Token budget for the formula context window
    pub formula_context_tokens: usize,
    /// Generator confidence below which a warning is added
    pub min_generator_confidence: f32,
    /// Optional timeout for the whole validation (milliseconds)
    pub timeout_ms: Option<u64>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            exact_min_score: 0.3,
            parent_decay: 0.9,
            topic_decay: 0.85,
            keyword_decay: 0.8,
            stage_min_score: 0.3,
            max_stage_keywords: 3,
            weights: CategoryWeights::default(),
            hallucination_threshold: 0.3,
            similarity_threshold: 0.7,
            max_terms: 10,
            formula_context_tokens: 1500,
            min_generator_confidence: 0.7,
            timeout_ms: None,
        }
    }
}

/// Per-category weights (terms / codes / formulas)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryWeights {
    pub terms: f32,
    pub codes: f32,
    pub formulas: f32,
}

impl Default for CategoryWeights {
    fn default() -> Self {
        Self {
            terms: 0.3,
            codes: 0.4,
            formulas: 0.3,
        }
    }
}

/// Ollama configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Ollama base URL
    pub base_url: String,
    /// Embedding model name
    pub embed_model: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            timeout_secs: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RagConfig::from_toml_str(
            r#"
            [retrieval]
            top_k = 8

            [validation.weights]
            codes = 0.5
            "#,
        )
        .unwrap();

        assert_eq!(config.retrieval.top_k, 8);
        assert_eq!(config.retrieval.rrf_k, 60.0);
        assert_eq!(config.validation.weights.codes, 0.5);
        assert_eq!(config.validation.weights.terms, 0.3);
        assert_eq!(config.embeddings.dimensions, 768);
    }

    #[test]
    fn test_section_chunk_size_never_shrinks() {
        let config = ChunkingConfig {
            chunk_size: 900,
            ..Default::default()
        };
        assert_eq!(config.section_chunk_size(DocumentType::FormulaSheet), 900);
        assert_eq!(config.section_chunk_size(DocumentType::Reference), 1000);
    }
}
