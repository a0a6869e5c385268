//! Core types for the retrieval engine

pub mod context;
pub mod document;
pub mod query;
pub mod validation;

pub use context::RagContext;
pub use document::{Chunk, ChunkSource, Document, DocumentType};
pub use query::{MatchType, RetrievalOptions, RetrievalQuery, RetrievalResult, ScoredChunk};
pub use validation::{
    CategoryValidation, CodeValidation, CodeVerification, TermCorrection, TermValidation,
    ValidationResult, VerificationStage,
};
