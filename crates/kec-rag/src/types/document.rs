//! Document and chunk types with source tracking for citations

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

/// Kind of source document
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    /// Textbook or reference material
    #[default]
    Reference,
    /// Regulation text with numbered clauses (e.g. KEC)
    Regulation,
    /// Formula sheet
    FormulaSheet,
}

impl DocumentType {
    /// Infer the document type from a file name.
    ///
    /// Falls back to `Reference`.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        if name.contains("formula") || name.contains("공식") {
            Self::FormulaSheet
        } else if name.contains("kec") || name.contains("regulation") || name.contains("규정") || name.contains("기준") {
            Self::Regulation
        } else {
            Self::Reference
        }
    }

    /// Get display name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Reference => "Reference",
            Self::Regulation => "Regulation",
            Self::FormulaSheet => "Formula sheet",
        }
    }
}

/// A document that has been ingested
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Unique document ID
    pub id: Uuid,
    /// Display name used in citations
    pub name: String,
    /// Document type
    pub doc_type: DocumentType,
    /// Source path the text was loaded from
    pub source_path: String,
    /// Total number of chunks created
    pub total_chunks: u32,
    /// Ingestion timestamp
    pub ingested_at: chrono::DateTime<chrono::Utc>,
    /// Free-form metadata (e.g. topic category)
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    /// Create a new document
    pub fn new(name: impl Into<String>, doc_type: DocumentType, source_path: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            doc_type,
            source_path: source_path.into(),
            total_chunks: 0,
            ingested_at: chrono::Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Topic category from metadata, if any
    pub fn topic(&self) -> Option<&str> {
        self.metadata.get("topic").and_then(|v| v.as_str())
    }
}

/// Source information for a chunk (used for citations)
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkSource {
    /// Document display name
    pub document_name: String,
    /// Document type
    pub doc_type: DocumentType,
    /// Heading hierarchy (e.g., ["제2장 저압전기설비", "232.3 분기회로"])
    #[serde(default)]
    pub heading_path: Vec<String>,
}

impl ChunkSource {
    /// Create source info for a document
    pub fn for_document(document: &Document) -> Self {
        Self {
            document_name: document.name.clone(),
            doc_type: document.doc_type,
            heading_path: Vec::new(),
        }
    }

    /// Same source under a heading path
    pub fn with_heading_path(mut self, heading_path: Vec<String>) -> Self {
        self.heading_path = heading_path;
        self
    }

    /// Innermost heading, if any
    pub fn section_title(&self) -> Option<&str> {
        self.heading_path.last().map(String::as_str)
    }
}

/// A chunk of text from a document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Unique chunk ID
    pub id: Uuid,
    /// Parent document ID
    pub document_id: Uuid,
    /// Chunk index within document
    pub chunk_index: u32,
    /// Text content (never empty)
    pub content: String,
    /// Estimated token count of `content`
    pub token_count: usize,
    /// Byte length of the prefix of `content` carried over from the previous chunk
    #[serde(default)]
    pub overlap_len: usize,
    /// Domain keywords found in the content
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Structured codes (regulatory clause numbers) found in the content
    #[serde(default)]
    pub codes: Vec<String>,
    /// Inferred topic category
    pub topic: Option<String>,
    /// Embedding vector
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub embedding: Vec<f32>,
    /// Source information for citations
    pub source: ChunkSource,
}

impl Chunk {
    /// Create a new chunk without an embedding
    pub fn new(document_id: Uuid, chunk_index: u32, content: String, token_count: usize, source: ChunkSource) -> Self {
        Self {
            id: Uuid::new_v4(),
            document_id,
            chunk_index,
            content,
            token_count,
            overlap_len: 0,
            keywords: Vec::new(),
            codes: Vec::new(),
            topic: None,
            embedding: Vec::new(),
            source,
        }
    }

    /// Content without the prefix carried over from the previous chunk
    pub fn fresh_content(&self) -> &str {
        let start = self.overlap_len.min(self.content.len());
        if self.content.is_char_boundary(start) {
            self.content[start..].trim_start()
        } else {
            &self.content
        }
    }

    /// Whether the chunk cites the given code exactly
    pub fn has_code(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c == code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_type_from_path() {
        assert_eq!(DocumentType::from_path(Path::new("docs/KEC_2021.txt")), DocumentType::Regulation);
        assert_eq!(DocumentType::from_path(Path::new("전기공식_정리.md")), DocumentType::FormulaSheet);
        assert_eq!(DocumentType::from_path(Path::new("전기기사_이론.txt")), DocumentType::Reference);
    }

    #[test]
    fn test_fresh_content_drops_overlap() {
        let mut chunk = Chunk::new(Uuid::new_v4(), 1, "이전 문장. 새 문장.".to_string(), 10, ChunkSource::default());
        chunk.overlap_len = "이전 문장.".len();
        assert_eq!(chunk.fresh_content(), "새 문장.");
    }
}
