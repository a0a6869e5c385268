//! Embedding orchestration with a bounded cache

pub mod cache;
pub mod service;

pub use cache::{CacheStats, EmbeddingCache};
pub use service::{BatchEmbedding, EmbeddingService};
