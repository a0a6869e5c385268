//! Retrieval query and result types

use serde::{Deserialize, Serialize};

use super::document::Chunk;

/// How a result was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Pure vector similarity
    Vector,
    /// Keyword match (including the code fallback path)
    Keyword,
    /// Blend of vector similarity and keyword match
    Hybrid,
    /// Structured code lookup
    Code,
}

/// Options for a retrieval query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOptions {
    /// Number of results to return
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    /// Minimum score (0.0-1.0)
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    /// Restrict to a topic category
    #[serde(default)]
    pub topic: Option<String>,
    /// Blend keyword matching into the ranking
    #[serde(default = "default_include_keywords")]
    pub include_keywords: bool,
}

fn default_top_k() -> usize {
    5
}

fn default_min_score() -> f32 {
    0.5
}

fn default_include_keywords() -> bool {
    true
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            min_score: default_min_score(),
            topic: None,
            include_keywords: default_include_keywords(),
        }
    }
}

impl RetrievalOptions {
    /// Set the number of results to retrieve
    pub fn with_top_k(mut self, k: usize) -> Self {
        self.top_k = k;
        self
    }

    /// Set the minimum score
    pub fn with_min_score(mut self, min_score: f32) -> Self {
        self.min_score = min_score;
        self
    }

    /// Restrict to a topic
    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }

    /// Vector similarity only
    pub fn vector_only(mut self) -> Self {
        self.include_keywords = false;
        self
    }
}

/// A retrieval query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalQuery {
    /// Free-text query
    pub text: String,
    /// Query options
    #[serde(default)]
    pub options: RetrievalOptions,
}

impl RetrievalQuery {
    /// Create a query with default options
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            options: RetrievalOptions::default(),
        }
    }

    /// Create a query with explicit options
    pub fn with_options(text: impl Into<String>, options: RetrievalOptions) -> Self {
        Self {
            text: text.into(),
            options,
        }
    }
}

/// A chunk scored by the store
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    /// The matched chunk
    pub chunk: Chunk,
    /// Store-native score (0.0-1.0, higher is better)
    pub score: f32,
}

/// A ranked retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    /// The retrieved chunk
    pub chunk: Chunk,
    /// Score in [0, 1]
    pub score: f32,
    /// How the chunk was matched
    pub match_type: MatchType,
}

impl RetrievalResult {
    /// Create a result, clamping the score into [0, 1]
    pub fn new(chunk: Chunk, score: f32, match_type: MatchType) -> Self {
        Self {
            chunk,
            score: score.clamp(0.0, 1.0),
            match_type,
        }
    }

    /// Same result with its score multiplied by `factor`
    pub fn decayed(mut self, factor: f32) -> Self {
        self.score = (self.score * factor).clamp(0.0, 1.0);
        self
    }
}

/// Sort results by score, highest first
pub fn sort_by_score(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
}

/// Keep the highest-scoring result per chunk id, sorted by score
pub fn dedup_by_chunk(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut positions: std::collections::HashMap<uuid::Uuid, usize> = std::collections::HashMap::new();
    let mut merged: Vec<RetrievalResult> = Vec::with_capacity(results.len());

    for result in results {
        match positions.get(&result.chunk.id) {
            Some(&pos) => {
                if result.score > merged[pos].score {
                    merged[pos] = result;
                }
            }
            None => {
                positions.insert(result.chunk.id, merged.len());
                merged.push(result);
            }
        }
    }

    sort_by_score(&mut merged);
    merged
}
