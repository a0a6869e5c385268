//! Error types for the retrieval and validation engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Embedding provider error or timeout
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// Embedding vector has the wrong number of components
    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Retrieval could not be completed
    #[error("Retrieval failed: {0}")]
    Retrieval(String),

    /// Chunk store error
    #[error("Chunk store error: {0}")]
    Store(String),

    /// Extracted claims had an unexpected shape
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Document ingestion error
    #[error("Failed to ingest '{source_path}': {message}")]
    Ingestion { source_path: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create a retrieval error
    pub fn retrieval(message: impl Into<String>) -> Self {
        Self::Retrieval(message.into())
    }

    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an ingestion error
    pub fn ingestion(source_path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Ingestion {
            source_path: source_path.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Whether this error came from the embedding provider
    pub fn is_embedding(&self) -> bool {
        matches!(self, Self::Embedding(_) | Self::DimensionMismatch { .. })
    }
}
