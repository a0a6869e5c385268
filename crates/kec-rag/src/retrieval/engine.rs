//! Hybrid retrieval with synonym expansion, score filtering, a structured-code
//! fallback and multi-query fusion

use futures::future::join_all;
use std::sync::Arc;

use crate::config::RetrievalConfig;
use crate::domain::codes::code_like_substrings;
use crate::domain::{DomainTables, QueryNormalizer};
use crate::embeddings::EmbeddingService;
use crate::error::{Error, Result};
use crate::providers::{ChunkStore, SearchOptions};
use crate::types::query::dedup_by_chunk;
use crate::types::{MatchType, RagContext, RetrievalOptions, RetrievalQuery, RetrievalResult};

use super::expansion::QueryExpander;
use super::fusion::reciprocal_rank_fusion;

/// Options for `build_context`
#[derive(Debug, Clone)]
pub struct ContextOptions {
    /// Maximum number of chunks accepted
    pub top_k: usize,
    /// Token budget for the accepted chunks
    pub max_tokens: usize,
    /// Minimum score before widening
    pub min_score: f32,
    /// Restrict to a topic category
    pub topic: Option<String>,
}

/// Retrieval engine over a chunk store
pub struct RetrievalEngine {
    store: Arc<dyn ChunkStore>,
    embeddings: Arc<EmbeddingService>,
    expander: QueryExpander,
    normalizer: QueryNormalizer,
    config: RetrievalConfig,
}

impl RetrievalEngine {
    pub fn new(
        store: Arc<dyn ChunkStore>,
        embeddings: Arc<EmbeddingService>,
        tables: &DomainTables,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            expander: QueryExpander::new(tables.synonyms.clone(), config.max_synonyms_per_group),
            normalizer: QueryNormalizer::new(tables),
            config,
        }
    }

    /// Retrieval options from the configured defaults
    pub fn default_options(&self) -> RetrievalOptions {
        RetrievalOptions::default()
            .with_top_k(self.config.top_k)
            .with_min_score(self.config.min_score)
    }

    /// The store this engine searches
    pub fn store(&self) -> &Arc<dyn ChunkStore> {
        &self.store
    }

    /// Single-query hybrid retrieval.
    ///
    /// Results below `min_score` are dropped; when nothing survives, code-like
    /// substrings of the raw query are looked up fuzzily instead. An
    /// embedding failure only falls through to that code lookup.
    pub async fn retrieve(&self, query: &RetrievalQuery) -> Result<Vec<RetrievalResult>> {
        let options = &query.options;
        let text = if self.config.normalize_queries {
            self.normalizer.normalize(&query.text)
        } else {
            query.text.trim().to_string()
        };
        let expanded = self.expander.expand(&text);

        tracing::debug!("Retrieving for '{}' (expanded: '{}')", query.text, expanded);

        let codes = code_like_substrings(&query.text);
        let (primary, fallback) = futures::join!(self.primary_search(&expanded, options), self.code_fallback(&codes));

        let mut embedding_error = None;
        let mut results: Vec<RetrievalResult> = match primary {
            Ok(results) => results
                .into_iter()
                .filter(|r| r.score >= options.min_score)
                .collect(),
            Err(e) if e.is_embedding() => {
                tracing::warn!("Query embedding failed, using code fallback: {}", e);
                embedding_error = Some(e);
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        if results.is_empty() {
            results = fallback?;
            if !results.is_empty() {
                tracing::debug!("Code fallback found {} results for {:?}", results.len(), codes);
            }
        }

        if results.is_empty() {
            if let Some(e) = embedding_error {
                return Err(Error::retrieval(format!("no results after code fallback: {}", e)));
            }
        }

        results.truncate(options.top_k);
        Ok(results)
    }

    async fn primary_search(&self, expanded: &str, options: &RetrievalOptions) -> Result<Vec<RetrievalResult>> {
        let vector = self.embeddings.embed_query(expanded).await?;

        let search = SearchOptions {
            limit: options.top_k.saturating_mul(2),
            topic: options.topic.clone(),
            semantic_weight: self.config.semantic_weight,
        };

        let (scored, match_type) = if options.include_keywords {
            (self.store.hybrid_search(&vector, expanded, &search).await?, MatchType::Hybrid)
        } else {
            (self.store.search_by_vector(&vector, &search).await?, MatchType::Vector)
        };

        Ok(scored
            .into_iter()
            .map(|s| RetrievalResult::new(s.chunk, s.score, match_type))
            .collect())
    }

    async fn code_fallback(&self, codes: &[String]) -> Result<Vec<RetrievalResult>> {
        if codes.is_empty() {
            return Ok(Vec::new());
        }

        let lookups = join_all(codes.iter().map(|code| self.store.fuzzy_search_by_code(code))).await;

        let mut results = Vec::new();
        for lookup in lookups {
            results.extend(
                lookup?
                    .into_iter()
                    .map(|s| RetrievalResult::new(s.chunk, s.score, MatchType::Keyword)),
            );
        }
        Ok(dedup_by_chunk(results))
    }

    /// Run several queries independently and fuse their rankings with RRF
    pub async fn multi_query_retrieve(
        &self,
        queries: &[String],
        options: &RetrievalOptions,
    ) -> Result<Vec<RetrievalResult>> {
        let requests: Vec<RetrievalQuery> = queries
            .iter()
            .map(|q| RetrievalQuery::with_options(q.clone(), options.clone()))
            .collect();
        let runs = join_all(requests.iter().map(|r| self.retrieve(r))).await;

        let mut lists = Vec::with_capacity(runs.len());
        let mut last_error = None;
        for (query, run) in queries.iter().zip(runs) {
            match run {
                Ok(results) => lists.push(results),
                Err(e) => {
                    tracing::warn!("Sub-query '{}' failed: {}", query, e);
                    last_error = Some(e);
                }
            }
        }

        if lists.is_empty() {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        let mut fused = reciprocal_rank_fusion(lists, self.config.rrf_k);
        fused.truncate(options.top_k);
        Ok(fused)
    }

    /// Exact code lookup (score 1.0), falling back to the store's fuzzy match
    pub async fn retrieve_by_code(&self, code: &str) -> Result<Vec<RetrievalResult>> {
        let exact = self.store.search_by_code(code).await?;
        if !exact.is_empty() {
            return Ok(exact
                .into_iter()
                .map(|chunk| RetrievalResult::new(chunk, 1.0, MatchType::Code))
                .collect());
        }

        let fuzzy = self.store.fuzzy_search_by_code(code).await?;
        Ok(fuzzy
            .into_iter()
            .map(|s| RetrievalResult::new(s.chunk, s.score, MatchType::Code))
            .collect())
    }

    /// Widened retrieval packed into a token budget.
    ///
    /// Fetches `context_candidate_factor × top_k` candidates with a looser
    /// minimum score, then accepts results in score order until the budget
    /// would overflow or `top_k` results are accepted.
    pub async fn build_context(&self, query: &str, options: &ContextOptions) -> Result<RagContext> {
        let mut widened = RetrievalOptions::default()
            .with_top_k(options.top_k.saturating_mul(self.config.context_candidate_factor.max(1)))
            .with_min_score(options.min_score * self.config.context_min_score_factor);
        widened.topic = options.topic.clone();

        let results = self.retrieve(&RetrievalQuery::with_options(query, widened)).await?;
        let context = RagContext::within_budget(results, options.max_tokens, options.top_k);

        tracing::debug!(
            "Built context: {} chunks, {} tokens from {} sources",
            context.results.len(),
            context.total_tokens,
            context.sources.len()
        );

        Ok(context)
    }
}
