//! Service container: every component constructed once and shared

use std::sync::Arc;

use crate::config::RagConfig;
use crate::domain::{DomainTables, TokenEstimator};
use crate::embeddings::EmbeddingService;
use crate::error::Result;
use crate::generation::ContextAssembler;
use crate::ingestion::{Chunker, IngestPipeline};
use crate::providers::{ChunkStore, EmbeddingProvider, HashingEmbedder, MemoryChunkStore, OllamaEmbedder};
use crate::retrieval::RetrievalEngine;
use crate::validation::AnswerValidator;

/// Shared services
#[derive(Clone)]
pub struct RagServices {
    inner: Arc<RagServicesInner>,
}

struct RagServicesInner {
    config: RagConfig,
    tables: Arc<DomainTables>,
    store: Arc<dyn ChunkStore>,
    embeddings: Arc<EmbeddingService>,
    engine: Arc<RetrievalEngine>,
    assembler: Arc<ContextAssembler>,
    validator: AnswerValidator,
    pipeline: IngestPipeline,
}

impl RagServices {
    /// Services over an in-memory store; `offline` swaps Ollama for the
    /// hashing embedder
    pub fn from_config(config: RagConfig, offline: bool) -> Result<Self> {
        let provider: Arc<dyn EmbeddingProvider> = if offline {
            tracing::info!("Using offline hashing embeddings ({} dims)", config.embeddings.dimensions);
            Arc::new(HashingEmbedder::new(config.embeddings.dimensions))
        } else {
            tracing::info!(
                "Using Ollama at {} ({} for embeddings)",
                config.llm.base_url,
                config.llm.embed_model
            );
            Arc::new(OllamaEmbedder::new(&config.llm, config.embeddings.dimensions)?)
        };

        Self::new(config, provider, Arc::new(MemoryChunkStore::new()))
    }

    /// Services over explicit collaborators
    pub fn new(config: RagConfig, provider: Arc<dyn EmbeddingProvider>, store: Arc<dyn ChunkStore>) -> Result<Self> {
        let tables = Arc::new(DomainTables::load(config.domain_tables.as_deref())?);

        let embeddings = Arc::new(EmbeddingService::new(
            provider,
            config.embeddings.clone(),
            TokenEstimator::from_config(&config.chunking),
        ));
        let engine = Arc::new(RetrievalEngine::new(
            store.clone(),
            embeddings.clone(),
            &tables,
            config.retrieval.clone(),
        ));
        let assembler = Arc::new(ContextAssembler::new(engine.clone(), tables.clone(), config.context.clone()));
        let validator = AnswerValidator::new(assembler.clone(), config.validation.clone());
        let pipeline = IngestPipeline::new(
            Chunker::new(config.chunking.clone(), tables.clone()),
            embeddings.clone(),
            store.clone(),
        );

        tracing::info!("Services ready (store: {})", store.name());

        Ok(Self {
            inner: Arc::new(RagServicesInner {
                config,
                tables,
                store,
                embeddings,
                engine,
                assembler,
                validator,
                pipeline,
            }),
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.inner.config
    }

    pub fn tables(&self) -> &Arc<DomainTables> {
        &self.inner.tables
    }

    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.inner.store
    }

    pub fn embeddings(&self) -> &Arc<EmbeddingService> {
        &self.inner.embeddings
    }

    pub fn engine(&self) -> &Arc<RetrievalEngine> {
        &self.inner.engine
    }

    pub fn assembler(&self) -> &Arc<ContextAssembler> {
        &self.inner.assembler
    }

    pub fn validator(&self) -> &AnswerValidator {
        &self.inner.validator
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.inner.pipeline
    }
}
