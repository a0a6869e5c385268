//! Typed repository over the vector/keyword chunk store

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::types::{Chunk, Document, ScoredChunk};

/// Options shared by the search operations
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum number of results
    pub limit: usize,
    /// Restrict to chunks with this topic category
    pub topic: Option<String>,
    /// Weight of vector similarity in a hybrid blend (keyword gets the rest)
    pub semantic_weight: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            topic: None,
            semantic_weight: 0.5,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Default::default()
        }
    }
}

/// Chunk store used by ingestion and retrieval
///
/// Implementations:
/// - `MemoryChunkStore`: in-process store with brute-force cosine search
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Weighted blend of vector similarity and keyword match
    async fn hybrid_search(
        &self,
        vector: &[f32],
        keyword_query: &str,
        options: &SearchOptions,
    ) -> Result<Vec<ScoredChunk>>;

    /// Pure vector similarity
    async fn search_by_vector(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<ScoredChunk>>;

    /// Chunks whose code set contains exactly `code`
    async fn search_by_code(&self, code: &str) -> Result<Vec<Chunk>>;

    /// Chunks related to `code` with a native match score
    async fn fuzzy_search_by_code(&self, code: &str) -> Result<Vec<ScoredChunk>>;

    /// Insert chunks, returning the number stored
    async fn insert_chunks(&self, chunks: Vec<Chunk>) -> Result<usize>;

    /// Register a document
    async fn create_document(&self, document: Document) -> Result<Document>;

    /// Look up a document
    async fn get_document(&self, id: &Uuid) -> Result<Option<Document>>;

    /// Delete a document and its chunks, returning the number of chunks removed
    async fn delete_document(&self, id: &Uuid) -> Result<usize>;

    /// Documents ingested from `source_path`
    async fn find_documents_by_source(&self, source_path: &str) -> Result<Vec<Document>>;

    /// Number of stored chunks
    async fn chunk_count(&self) -> Result<usize>;

    /// Store name for logging
    fn name(&self) -> &str;
}
