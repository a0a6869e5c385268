//! Shared fixtures: a small regulatory corpus in an in-memory store

use std::sync::Arc;
use uuid::Uuid;

use crate::config::{EmbeddingConfig, RetrievalConfig};
use crate::domain::codes::extract_codes;
use crate::domain::{DomainTables, TokenEstimator};
use crate::embeddings::EmbeddingService;
use crate::error::Error;
use crate::providers::embedding::MockEmbeddingProvider;
use crate::providers::{ChunkStore, HashingEmbedder, MemoryChunkStore};
use crate::retrieval::RetrievalEngine;
use crate::types::{Chunk, ChunkSource, DocumentType};

pub(crate) const DIMENSIONS: usize = 256;

/// (document, heading, content)
pub(crate) const CORPUS: &[(&str, &str, &str)] = &[
    (
        "KEC 해설",
        "142.2 접지극의 시설",
        "KEC 142.2 접지극의 시설: 접지저항 계산은 접지극의 형상과 매설 깊이에 따른다. 접지시스템의 접지극은 지하 0.75 m 이상 깊이에 매설한다.",
    ),
    (
        "KEC 해설",
        "142.6 공통접지",
        "KEC 142.6 공통접지 및 통합접지: 등전위본딩을 하여 접지시스템을 공용한다.",
    ),
    (
        "KEC 해설",
        "230 조명설비",
        "KEC 230 조명설비는 조도 기준에 맞게 광속법으로 설계한다. 조명률과 감광보상률을 적용한다.",
    ),
    (
        "전기설비 공식집",
        "역률 개선",
        "역률 개선용 전력용 콘덴서 용량 Qc = P(tanθ1 - tanθ2) kVar 로 계산한다.",
    ),
    (
        "KEC 해설",
        "232.5 허용전류",
        "KEC 232.5 배선설비의 허용전류와 전압강하를 고려하여 전선 굵기를 선정한다.",
    ),
    (
        "변압기 참고서",
        "변압기 용량",
        "변압기 용량은 수용률과 부등률, 부하율을 고려하여 kVA 단위로 산정한다.",
    ),
];

pub(crate) fn tables() -> Arc<DomainTables> {
    Arc::new(DomainTables::builtin().unwrap())
}

fn embedding_config() -> EmbeddingConfig {
    EmbeddingConfig {
        dimensions: DIMENSIONS,
        batch_delay_ms: 0,
        ..Default::default()
    }
}

pub(crate) fn embedding_service() -> Arc<EmbeddingService> {
    Arc::new(EmbeddingService::new(
        Arc::new(HashingEmbedder::new(DIMENSIONS)),
        embedding_config(),
        TokenEstimator::default(),
    ))
}

/// Chunk enriched the same way the chunker does
pub(crate) fn corpus_chunk(tables: &DomainTables, document: &str, heading: &str, content: &str) -> Chunk {
    let source = ChunkSource {
        document_name: document.to_string(),
        doc_type: DocumentType::Regulation,
        heading_path: vec![heading.to_string()],
    };
    let token_count = TokenEstimator::default().estimate(content);

    let mut chunk = Chunk::new(Uuid::new_v4(), 0, content.to_string(), token_count, source);
    chunk.codes = extract_codes(content);
    chunk.keywords = tables.keywords_in(content, 12);
    chunk.topic = tables.infer_topic(content);
    chunk.embedding = HashingEmbedder::new(DIMENSIONS).embed_sync(content);
    chunk
}

pub(crate) async fn corpus_store() -> Arc<MemoryChunkStore> {
    let tables = tables();
    let store = Arc::new(MemoryChunkStore::new());
    let chunks = CORPUS
        .iter()
        .map(|(document, heading, content)| corpus_chunk(&tables, document, heading, content))
        .collect();
    store.insert_chunks(chunks).await.unwrap();
    store
}

pub(crate) async fn corpus_engine() -> (Arc<RetrievalEngine>, Arc<MemoryChunkStore>) {
    let store = corpus_store().await;
    let engine = RetrievalEngine::new(
        store.clone(),
        embedding_service(),
        &tables(),
        RetrievalConfig::default(),
    );
    (Arc::new(engine), store)
}

/// Engine whose embedding provider always fails
pub(crate) async fn failing_engine() -> Arc<RetrievalEngine> {
    let mut provider = MockEmbeddingProvider::new();
    provider
        .expect_embed()
        .returning(|_| Err(Error::embedding("provider unavailable")));

    let embeddings = Arc::new(EmbeddingService::new(
        Arc::new(provider),
        embedding_config(),
        TokenEstimator::default(),
    ));

    Arc::new(RetrievalEngine::new(
        corpus_store().await,
        embeddings,
        &tables(),
        RetrievalConfig::default(),
    ))
}

/// Engine whose provider fails only for texts containing `trigger`
pub(crate) async fn selectively_failing_engine(trigger: &'static str) -> Arc<RetrievalEngine> {
    let hashing = HashingEmbedder::new(DIMENSIONS);
    let mut provider = MockEmbeddingProvider::new();
    provider.expect_embed().returning(move |text| {
        if text.contains(trigger) {
            Err(Error::embedding("provider unavailable"))
        } else {
            Ok(hashing.embed_sync(text))
        }
    });

    let embeddings = Arc::new(EmbeddingService::new(
        Arc::new(provider),
        embedding_config(),
        TokenEstimator::default(),
    ));

    Arc::new(RetrievalEngine::new(
        corpus_store().await,
        embeddings,
        &tables(),
        RetrievalConfig::default(),
    ))
}
