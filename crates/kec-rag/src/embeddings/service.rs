//! Embedding orchestration: caching, batching and rate limiting around an
//! embedding provider

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::domain::TokenEstimator;
use crate::error::Result;
use crate::providers::EmbeddingProvider;

use super::cache::{CacheStats, EmbeddingCache};

/// Vectors for a batch of texts, in input order
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchEmbedding {
    pub vectors: Vec<Vec<f32>>,
    /// Estimated tokens across all inputs
    pub total_tokens: usize,
}

/// Turns chunk and query text into vectors.
///
/// Provider errors are returned as-is and never retried here; callers pick
/// the fallback policy.
pub struct EmbeddingService {
    provider: Arc<dyn EmbeddingProvider>,
    cache: EmbeddingCache,
    config: EmbeddingConfig,
    estimator: TokenEstimator,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: EmbeddingConfig, estimator: TokenEstimator) -> Self {
        let cache = EmbeddingCache::new(config.cache_capacity);
        Self {
            provider,
            cache,
            config,
            estimator,
        }
    }

    /// Expected vector dimensions
    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    /// Embed one text, consulting the cache first
    pub async fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(vector) = self.cache.get(text) {
            return Ok(vector);
        }

        let vector = self.provider.embed(text).await?;
        self.check_dimensions(&vector);
        self.cache.insert(text, vector.clone());
        Ok(vector)
    }

    /// Embed a search query (with the configured query prefix, if any)
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        match &self.config.query_prefix {
            Some(prefix) => self.embed_text(&format!("{}{}", prefix, text)).await,
            None => self.embed_text(text).await,
        }
    }

    /// Embed many texts.
    ///
    /// Texts are processed in batches of at most `max_batch_size`; uncached
    /// texts go to the provider one at a time with `batch_delay_ms` between
    /// calls.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<BatchEmbedding> {
        let mut vectors = Vec::with_capacity(texts.len());
        let delay = Duration::from_millis(self.config.batch_delay_ms);
        let batch_size = self.config.max_batch_size.max(1);
        let total_batches = texts.len().div_ceil(batch_size);
        let mut provider_calls = 0usize;

        for (batch_num, batch) in texts.chunks(batch_size).enumerate() {
            for text in batch {
                if let Some(vector) = self.cache.get(text) {
                    vectors.push(vector);
                    continue;
                }

                if provider_calls > 0 && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                provider_calls += 1;

                let vector = self.provider.embed(text).await?;
                self.check_dimensions(&vector);
                self.cache.insert(text, vector.clone());
                vectors.push(vector);
            }

            tracing::debug!("Embedded batch {}/{} ({} texts)", batch_num + 1, total_batches, batch.len());
        }

        let total_tokens = texts.iter().map(|t| self.estimator.estimate(t)).sum();

        Ok(BatchEmbedding { vectors, total_tokens })
    }

    /// Drop all cached vectors
    pub fn clear_cache(&self) {
        let stats = self.cache.stats();
        tracing::info!(
            "Clearing embedding cache ({} entries, {} hits, {} misses)",
            stats.entries,
            stats.hits,
            stats.misses
        );
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    fn check_dimensions(&self, vector: &[f32]) {
        if vector.len() != self.config.dimensions {
            tracing::warn!(
                "Embedding dimension mismatch: expected {}, got {}",
                self.config.dimensions,
                vector.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::providers::embedding::MockEmbeddingProvider;
    use std::time::Instant;

    fn config(dimensions: usize, delay_ms: u64) -> EmbeddingConfig {
        EmbeddingConfig {
            dimensions,
            max_batch_size: 2,
            batch_delay_ms: delay_ms,
            cache_capacity: 100,
            query_prefix: None,
        }
    }

    #[tokio::test]
    async fn test_second_embed_is_cache_hit() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().times(1).returning(|_| Ok(vec![0.5; 4]));

        let service = EmbeddingService::new(Arc::new(provider), config(4, 0), TokenEstimator::default());
        let first = service.embed_text("접지저항 계산").await.unwrap();
        let second = service.embed_text("접지저항 계산").await.unwrap();

        assert_eq!(first, second);
        assert_eq!(service.cache_stats().hits, 1);
    }

    #[tokio::test]
    async fn test_batch_uses_cache_and_counts_tokens() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .times(3)
            .returning(|text| Ok(vec![text.chars().count() as f32; 4]));

        let service = EmbeddingService::new(Arc::new(provider), config(4, 0), TokenEstimator::default());
        let texts: Vec<String> = ["조명", "역률", "조명", "grounding"].iter().map(|s| s.to_string()).collect();
        let batch = service.embed_batch(&texts).await.unwrap();

        assert_eq!(batch.vectors.len(), 4);
        assert_eq!(batch.vectors[0], batch.vectors[2]);
        let expected: usize = texts.iter().map(|t| TokenEstimator::default().estimate(t)).sum();
        assert_eq!(batch.total_tokens, expected);
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_not_fatal() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().returning(|_| Ok(vec![1.0; 3]));

        let service = EmbeddingService::new(Arc::new(provider), config(768, 0), TokenEstimator::default());
        assert_eq!(service.embed_text("a").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_provider_error_is_not_retried() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .times(1)
            .returning(|_| Err(Error::embedding("rate limited")));

        let service = EmbeddingService::new(Arc::new(provider), config(4, 0), TokenEstimator::default());
        let err = service.embed_text("a").await.unwrap_err();
        assert!(err.is_embedding());
        assert!(service.cache_stats().entries == 0);
    }

    #[tokio::test]
    async fn test_calls_are_spaced_by_delay() {
        let mut provider = MockEmbeddingProvider::new();
        provider.expect_embed().times(3).returning(|_| Ok(vec![0.0; 4]));

        let service = EmbeddingService::new(Arc::new(provider), config(4, 20), TokenEstimator::default());
        let texts: Vec<String> = ["a", "b", "c"].iter().map(|s| s.to_string()).collect();

        let started = Instant::now();
        service.embed_batch(&texts).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn test_query_prefix() {
        let mut provider = MockEmbeddingProvider::new();
        provider
            .expect_embed()
            .withf(|text| text == "search_query: 조도")
            .times(1)
            .returning(|_| Ok(vec![0.0; 4]));

        let mut cfg = config(4, 0);
        cfg.query_prefix = Some("search_query: ".to_string());
        let service = EmbeddingService::new(Arc::new(provider), cfg, TokenEstimator::default());
        service.embed_query("조도").await.unwrap();
    }
}
