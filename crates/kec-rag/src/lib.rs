//! kec-rag: retrieval and answer grounding over regulatory reference corpora
//!
//! This crate chunks and embeds Korean Electrical Code (KEC) material,
//! retrieves it with hybrid vector/keyword search that understands dotted
//! clause numbers, assembles token-budgeted contexts for answer generators,
//! and validates generated answers against the corpus.

pub mod config;
pub mod domain;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod providers;
pub mod retrieval;
pub mod state;
pub mod types;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use config::RagConfig;
pub use error::{Error, Result};
pub use generation::ContextAssembler;
pub use retrieval::RetrievalEngine;
pub use state::RagServices;
pub use types::{
    document::{Chunk, ChunkSource, Document, DocumentType},
    RagContext, RetrievalResult, ValidationResult,
};
pub use validation::{AnswerValidator, ValidationContext};
