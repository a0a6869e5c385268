//! Document ingestion: section extraction, chunking and storage

pub mod chunker;
pub mod pipeline;
pub mod sections;

pub use chunker::{ChunkMeta, Chunker};
pub use pipeline::{IngestFailure, IngestPipeline, IngestReport};
pub use sections::{parse_sections, Section};
