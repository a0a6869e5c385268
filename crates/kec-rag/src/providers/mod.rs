//! Provider abstractions for embeddings and chunk storage
//!
//! Trait-based seams so the engine can run against a local Ollama server or
//! fully offline with the hashing embedder and the in-memory store.

pub mod embedding;
pub mod hashing;
pub mod memory;
pub mod ollama;
pub mod store;

pub use embedding::EmbeddingProvider;
pub use hashing::HashingEmbedder;
pub use memory::MemoryChunkStore;
pub use ollama::OllamaEmbedder;
pub use store::{ChunkStore, SearchOptions};
