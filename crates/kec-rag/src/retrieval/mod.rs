//! Retrieval: query expansion, hybrid search, code fallback and fusion

pub mod engine;
pub mod expansion;
pub mod fusion;

pub use engine::{ContextOptions, RetrievalEngine};
pub use expansion::QueryExpander;
pub use fusion::reciprocal_rank_fusion;
