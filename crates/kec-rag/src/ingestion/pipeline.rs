//! Document ingestion: section parsing, chunking, embedding and an atomic
//! swap into the chunk store

use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

use crate::embeddings::EmbeddingService;
use crate::error::{Error, Result};
use crate::providers::ChunkStore;
use crate::types::{ChunkSource, Document, DocumentType};

use super::chunker::{ChunkMeta, Chunker};
use super::sections::{has_headings, parse_sections};

/// Extensions picked up by directory ingestion
const TEXT_EXTENSIONS: [&str; 3] = ["txt", "md", "markdown"];

/// A file that could not be ingested
#[derive(Debug, Clone)]
pub struct IngestFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Outcome of a directory run
#[derive(Debug, Default)]
pub struct IngestReport {
    pub ingested: Vec<Document>,
    pub failures: Vec<IngestFailure>,
}

impl IngestReport {
    pub fn total_chunks(&self) -> usize {
        self.ingested.iter().map(|d| d.total_chunks as usize).sum()
    }
}

/// Ingestion pipeline
pub struct IngestPipeline {
    chunker: Chunker,
    embeddings: Arc<EmbeddingService>,
    store: Arc<dyn ChunkStore>,
}

impl IngestPipeline {
    pub fn new(chunker: Chunker, embeddings: Arc<EmbeddingService>, store: Arc<dyn ChunkStore>) -> Self {
        Self {
            chunker,
            embeddings,
            store,
        }
    }

    /// Ingest one text file; the name is the file stem
    pub async fn ingest_file(&self, path: &Path, topic: Option<&str>) -> Result<Document> {
        let source_path = path.to_string_lossy().to_string();
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::ingestion(&source_path, e.to_string()))?;

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| source_path.clone());

        self.ingest_text(&name, &source_path, DocumentType::from_path(path), topic, &text)
            .await
    }

    /// Ingest text, replacing any earlier document with the same source path.
    ///
    /// The new document and its chunks are staged first. Old versions are
    /// deleted only after every chunk was stored; a failed insert removes the
    /// staged document and leaves the old version in place.
    pub async fn ingest_text(
        &self,
        name: &str,
        source_path: &str,
        doc_type: DocumentType,
        topic: Option<&str>,
        text: &str,
    ) -> Result<Document> {
        if text.trim().is_empty() {
            return Err(Error::ingestion(source_path, "document is empty"));
        }

        let mut document = Document::new(name, doc_type, source_path);
        if let Some(topic) = topic {
            document
                .metadata
                .insert("topic".to_string(), serde_json::Value::String(topic.to_string()));
        }

        let meta = ChunkMeta {
            document_id: document.id,
            source: ChunkSource::for_document(&document),
            topic: topic.map(str::to_string),
        };

        let sections = parse_sections(text);
        let mut chunks = if has_headings(&sections) {
            self.chunker.chunk_sections(&sections, &meta)
        } else {
            self.chunker.chunk(text, &meta)
        };
        if chunks.is_empty() {
            return Err(Error::ingestion(source_path, "no chunks produced"));
        }

        tracing::info!("[{}] Created {} chunks, generating embeddings...", name, chunks.len());

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let batch = self
            .embeddings
            .embed_batch(&texts)
            .await
            .map_err(|e| Error::ingestion(source_path, e.to_string()))?;
        for (chunk, vector) in chunks.iter_mut().zip(batch.vectors) {
            chunk.embedding = vector;
        }

        let expected = chunks.len();
        document.total_chunks = expected as u32;

        let previous = self
            .store
            .find_documents_by_source(source_path)
            .await
            .map_err(|e| Error::ingestion(source_path, e.to_string()))?;

        let document = self
            .store
            .create_document(document)
            .await
            .map_err(|e| Error::ingestion(source_path, e.to_string()))?;

        let inserted = match self.store.insert_chunks(chunks).await {
            Ok(count) if count == expected => count,
            Ok(count) => {
                self.rollback(&document).await;
                return Err(Error::ingestion(
                    source_path,
                    format!("stored {} of {} chunks", count, expected),
                ));
            }
            Err(e) => {
                self.rollback(&document).await;
                return Err(Error::ingestion(source_path, e.to_string()));
            }
        };

        for old in previous.iter().filter(|d| d.id != document.id) {
            match self.store.delete_document(&old.id).await {
                Ok(deleted) => tracing::info!("[{}] Replaced previous version, deleted {} old chunks", name, deleted),
                Err(e) => tracing::warn!("[{}] Could not delete previous version {}: {}", name, old.id, e),
            }
        }

        tracing::info!(
            "[{}] COMPLETE: {} chunks stored ({} tokens)",
            name,
            inserted,
            batch.total_tokens
        );

        Ok(document)
    }

    async fn rollback(&self, staged: &Document) {
        match self.store.delete_document(&staged.id).await {
            Ok(removed) => tracing::warn!("[{}] Rolled back staged version ({} chunks removed)", staged.name, removed),
            Err(e) => tracing::error!("[{}] Rollback of staged version {} failed: {}", staged.name, staged.id, e),
        }
    }

    /// Ingest every text file under `dir`; per-file failures are collected
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport> {
        if !dir.is_dir() {
            return Err(Error::ingestion(dir.to_string_lossy(), "not a directory"));
        }

        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| is_text_file(path))
            .collect();
        files.sort();

        tracing::info!("Ingesting {} files from {}", files.len(), dir.display());

        let mut report = IngestReport::default();
        for path in files {
            match self.ingest_file(&path, None).await {
                Ok(document) => report.ingested.push(document),
                Err(e) => {
                    tracing::error!("Failed to ingest {}: {}", path.display(), e);
                    report.failures.push(IngestFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }

        self.embeddings.clear_cache();

        tracing::info!(
            "Ingestion finished: {} documents, {} chunks, {} failures",
            report.ingested.len(),
            report.total_chunks(),
            report.failures.len()
        );

        Ok(report)
    }
}

fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| TEXT_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::providers::{MemoryChunkStore, SearchOptions};
    use crate::test_support::{embedding_service, tables};
    use crate::types::{Chunk, ScoredChunk};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use uuid::Uuid;

    const KEC_TEXT: &str = "# 제1장 접지시스템\n\
        142.2 접지극의 시설\n\
        접지극은 지하 0.75 m 이상 깊이에 매설한다. 접지저항 값은 접지극의 형상에 따른다.\n\
        142.6 공통접지 및 통합접지\n\
        KEC 142.6에 따라 등전위본딩을 하여 접지시스템을 공용한다.\n";

    fn pipeline(store: Arc<dyn ChunkStore>) -> IngestPipeline {
        let chunker = Chunker::new(ChunkingConfig::default(), tables());
        IngestPipeline::new(chunker, embedding_service(), store)
    }

    #[tokio::test]
    async fn test_ingest_text_enriches_chunks() {
        let store = Arc::new(MemoryChunkStore::new());
        let pipeline = pipeline(store.clone());

        let document = pipeline
            .ingest_text("KEC 해설", "kec.md", DocumentType::Regulation, Some("grounding"), KEC_TEXT)
            .await
            .unwrap();

        assert_eq!(document.topic(), Some("grounding"));
        assert!(document.total_chunks >= 2);
        assert_eq!(store.chunk_count().await.unwrap(), document.total_chunks as usize);

        let found = store.search_by_code("142.6").await.unwrap();
        assert!(!found.is_empty());
        assert_eq!(found[0].source.section_title(), Some("142.6 공통접지 및 통합접지"));
        assert_eq!(found[0].topic.as_deref(), Some("grounding"));
        assert!(!found[0].embedding.is_empty());
    }

    #[tokio::test]
    async fn test_empty_document_rejected() {
        let pipeline = pipeline(Arc::new(MemoryChunkStore::new()));
        let err = pipeline
            .ingest_text("empty", "empty.txt", DocumentType::Reference, None, "  \n ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Ingestion { .. }));
    }

    #[tokio::test]
    async fn test_reingestion_replaces_previous_version() {
        let store = Arc::new(MemoryChunkStore::new());
        let pipeline = pipeline(store.clone());

        let first = pipeline
            .ingest_text("KEC 해설", "kec.md", DocumentType::Regulation, None, KEC_TEXT)
            .await
            .unwrap();
        let second = pipeline
            .ingest_text("KEC 해설", "kec.md", DocumentType::Regulation, None, "230 조명설비\n조도 기준을 따른다.")
            .await
            .unwrap();

        assert!(store.get_document(&first.id).await.unwrap().is_none());
        assert!(store.get_document(&second.id).await.unwrap().is_some());
        assert_eq!(store.chunk_count().await.unwrap(), second.total_chunks as usize);
        assert!(store.search_by_code("142.6").await.unwrap().is_empty());
    }

    /// Memory store whose inserts can be switched to fail
    struct FlakyStore {
        inner: MemoryChunkStore,
        fail_inserts: AtomicBool,
    }

    #[async_trait]
    impl ChunkStore for FlakyStore {
        async fn hybrid_search(&self, vector: &[f32], query: &str, options: &SearchOptions) -> Result<Vec<ScoredChunk>> {
            self.inner.hybrid_search(vector, query, options).await
        }

        async fn search_by_vector(&self, vector: &[f32], options: &SearchOptions) -> Result<Vec<ScoredChunk>> {
            self.inner.search_by_vector(vector, options).await
        }

        async fn search_by_code(&self, code: &str) -> Result<Vec<Chunk>> {
            self.inner.search_by_code(code).await
        }

        async fn fuzzy_search_by_code(&self, code: &str) -> Result<Vec<ScoredChunk>> {
            self.inner.fuzzy_search_by_code(code).await
        }

        async fn insert_chunks(&self, chunks: Vec<Chunk>) -> Result<usize> {
            if self.fail_inserts.load(Ordering::SeqCst) {
                return Err(Error::store("connection reset"));
            }
            self.inner.insert_chunks(chunks).await
        }

        async fn create_document(&self, document: Document) -> Result<Document> {
            self.inner.create_document(document).await
        }

        async fn get_document(&self, id: &Uuid) -> Result<Option<Document>> {
            self.inner.get_document(id).await
        }

        async fn delete_document(&self, id: &Uuid) -> Result<usize> {
            self.inner.delete_document(id).await
        }

        async fn find_documents_by_source(&self, source_path: &str) -> Result<Vec<Document>> {
            self.inner.find_documents_by_source(source_path).await
        }

        async fn chunk_count(&self) -> Result<usize> {
            self.inner.chunk_count().await
        }

        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[tokio::test]
    async fn test_failed_reingestion_keeps_old_version() {
        let store = Arc::new(FlakyStore {
            inner: MemoryChunkStore::new(),
            fail_inserts: AtomicBool::new(false),
        });
        let pipeline = pipeline(store.clone());

        let original = pipeline
            .ingest_text("KEC 해설", "kec.md", DocumentType::Regulation, None, KEC_TEXT)
            .await
            .unwrap();
        let chunks_before = store.chunk_count().await.unwrap();

        store.fail_inserts.store(true, Ordering::SeqCst);
        let err = pipeline
            .ingest_text("KEC 해설", "kec.md", DocumentType::Regulation, None, "230 조명설비\n조도 기준.")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Ingestion { .. }));
        assert_eq!(store.chunk_count().await.unwrap(), chunks_before);
        let remaining = store.find_documents_by_source("kec.md").await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, original.id);
        assert!(!store.search_by_code("142.6").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ingest_directory_collects_failures() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("KEC_규정.md"), KEC_TEXT).unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("공식집.txt"), "역률 개선 Qc = P(tanθ1 - tanθ2)").unwrap();
        std::fs::write(dir.path().join("blank.txt"), "   ").unwrap();
        std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

        let store = Arc::new(MemoryChunkStore::new());
        let pipeline = pipeline(store.clone());
        let report = pipeline.ingest_directory(dir.path()).await.unwrap();

        assert_eq!(report.ingested.len(), 2);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("blank.txt"));
        assert_eq!(store.chunk_count().await.unwrap(), report.total_chunks());

        let kinds: Vec<DocumentType> = report.ingested.iter().map(|d| d.doc_type).collect();
        assert!(kinds.contains(&DocumentType::Regulation));
        assert!(kinds.contains(&DocumentType::FormulaSheet));

        tokio_test::assert_ok!(pipeline.ingest_directory(dir.path()).await);
        assert_eq!(store.documents().len(), 2);
    }

    #[tokio::test]
    async fn test_ingest_directory_requires_directory() {
        let pipeline = pipeline(Arc::new(MemoryChunkStore::new()));
        assert!(pipeline.ingest_directory(Path::new("/definitely/not/here")).await.is_err());
    }
}
