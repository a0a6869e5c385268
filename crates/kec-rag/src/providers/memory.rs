//! In-process chunk store with brute-force cosine and keyword search

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use unicode_segmentation::UnicodeSegmentation;
use uuid::Uuid;

use crate::domain::codes::{code_like_substrings, is_descendant};
use crate::error::{Error, Result};
use crate::types::{Chunk, Document, ScoredChunk};

use super::store::{ChunkStore, SearchOptions};

/// Fuzzy score for a chunk citing a sub-clause of the requested code
const DESCENDANT_SCORE: f32 = 0.8;

/// Fuzzy score for a chunk mentioning the code in running text only
const MENTION_SCORE: f32 = 0.5;

/// Chunk store kept entirely in memory
#[derive(Default)]
pub struct MemoryChunkStore {
    chunks: RwLock<Vec<Chunk>>,
    documents: DashMap<Uuid, Document>,
}

impl MemoryChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Documents currently registered
    pub fn documents(&self) -> Vec<Document> {
        self.documents.iter().map(|entry| entry.value().clone()).collect()
    }

    fn ranked<F>(&self, options: &SearchOptions, score: F) -> Vec<ScoredChunk>
    where
        F: Fn(&Chunk) -> f32,
    {
        let chunks = self.chunks.read();
        let mut results: Vec<ScoredChunk> = chunks
            .iter()
            .filter(|c| options.topic.is_none() || c.topic == options.topic)
            .filter_map(|chunk| {
                let s = score(chunk);
                (s > 0.0).then(|| ScoredChunk {
                    chunk: chunk.clone(),
                    score: s.clamp(0.0, 1.0),
                })
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(options.limit);
        results
    }
}

/// Cosine similarity clamped to [0, 1]; 0 for empty or mismatched vectors
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || a.len() != b.len() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(0.0, 1.0)
}

/// Share of query terms found in the chunk content or keyword set
fn keyword_score(terms: &[String], chunk: &Chunk) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }

    let content = chunk.content.to_lowercase();
    let hits = terms
        .iter()
        .filter(|term| {
            content.contains(term.as_str()) || chunk.keywords.iter().any(|k| k.to_lowercase() == **term)
        })
        .count();

    hits as f32 / terms.len() as f32
}

fn query_terms(query: &str) -> Vec<String> {
    let mut terms: Vec<String> = Vec::new();
    for word in query.to_lowercase().unicode_words() {
        if word.chars().count() >= 2 && !terms.iter().any(|t| t == word) {
            terms.push(word.to_string());
        }
    }
    terms
}

#[async_trait]
impl ChunkStore for MemoryChunkStore {
    async fn hybrid_search(
        &self,
        vector: &[f32],
        keyword_query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>> {
        let terms = query_terms(keyword_query);
        let weight = options.semantic_weight.clamp(0.0, 1.0);

        Ok(self.ranked(options, |chunk| {
            weight * cosine_similarity(vector, &chunk.embedding) + (1.0 - weight) * keyword_score(&terms, chunk)
        }))
    }

    async fn search_by_vector(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<ScoredChunk>> {
        Ok(self.ranked(options, |chunk| cosine_similarity(vector, &chunk.embedding)))
    }

    async fn search_by_code(&self, code: &str) -> Result<Vec<Chunk>> {
        let chunks = self.chunks.read();
        Ok(chunks
            .iter()
            .filter(|c| c.codes.iter().any(|own| own == code))
            .cloned()
            .collect())
    }

    async fn fuzzy_search_by_code(&self, code: &str) -> Result<Vec<ScoredChunk>> {
        let options = SearchOptions::with_limit(usize::MAX);
        Ok(self.ranked(&options, |chunk| {
            if chunk.codes.iter().any(|own| own == code) {
                1.0
            } else if chunk.codes.iter().any(|own| is_descendant(own, code)) {
                DESCENDANT_SCORE
            } else if code_like_substrings(&chunk.content).iter().any(|c| c == code) {
                MENTION_SCORE
            } else {
                0.0
            }
        }))
    }

    async fn insert_chunks(&self, chunks: Vec<Chunk>) -> Result<usize> {
        let count = chunks.len();
        let mut stored = self.chunks.write();

        // Vectors must share one dimension; chunks without a vector are code-only
        let expected = stored
            .iter()
            .chain(chunks.iter())
            .map(|c| c.embedding.len())
            .find(|&len| len > 0);
        if let Some(expected) = expected {
            if let Some(bad) = chunks.iter().find(|c| !c.embedding.is_empty() && c.embedding.len() != expected) {
                return Err(Error::DimensionMismatch {
                    expected,
                    actual: bad.embedding.len(),
                });
            }
        }

        stored.extend(chunks);
        Ok(count)
    }

    async fn create_document(&self, document: Document) -> Result<Document> {
        self.documents.insert(document.id, document.clone());
        Ok(document)
    }

    async fn get_document(&self, id: &Uuid) -> Result<Option<Document>> {
        Ok(self.documents.get(id).map(|entry| entry.value().clone()))
    }

    async fn delete_document(&self, id: &Uuid) -> Result<usize> {
        self.documents.remove(id);

        let mut chunks = self.chunks.write();
        let before = chunks.len();
        chunks.retain(|c| c.document_id != *id);
        Ok(before - chunks.len())
    }

    async fn find_documents_by_source(&self, source_path: &str) -> Result<Vec<Document>> {
        Ok(self
            .documents
            .iter()
            .filter(|entry| entry.value().source_path == source_path)
            .map(|entry| entry.value().clone())
            .collect())
    }

    async fn chunk_count(&self) -> Result<usize> {
        Ok(self.chunks.read().len())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
