//! Context assembly for downstream answer generators.
//!
//! Every assembler is fail-open: retrieval errors are logged and an empty,
//! well-formed `RagContext` is returned instead.

use futures::future::join_all;
use std::sync::Arc;

use crate::config::ContextConfig;
use crate::domain::codes::parent_code;
use crate::domain::{DomainTables, TopicProfile};
use crate::error::Result;
use crate::retrieval::{ContextOptions, RetrievalEngine};
use crate::types::query::dedup_by_chunk;
use crate::types::{RagContext, RetrievalOptions, RetrievalQuery, RetrievalResult};

/// Builds token-budgeted, citation-annotated contexts
pub struct ContextAssembler {
    engine: Arc<RetrievalEngine>,
    tables: Arc<DomainTables>,
    config: ContextConfig,
}

impl ContextAssembler {
    pub fn new(engine: Arc<RetrievalEngine>, tables: Arc<DomainTables>, config: ContextConfig) -> Self {
        Self { engine, tables, config }
    }

    pub fn engine(&self) -> &Arc<RetrievalEngine> {
        &self.engine
    }

    pub fn tables(&self) -> &Arc<DomainTables> {
        &self.tables
    }

    /// Most terms one verification context looks up
    pub fn max_verification_terms(&self) -> usize {
        self.config.max_verification_terms.max(1)
    }

    /// Profile for a topic key, or the configured default
    pub fn profile(&self, topic_key: &str) -> TopicProfile {
        match self.tables.topic_profile(topic_key) {
            Some(profile) => profile.clone(),
            None => {
                tracing::debug!("No topic profile for '{}', using defaults", topic_key);
                TopicProfile {
                    max_tokens: self.config.default_max_tokens,
                    top_k: self.config.default_top_k,
                    keywords: Vec::new(),
                }
            }
        }
    }

    /// Context for a downstream specialist identified by `topic_key`
    pub async fn get_context_for_agent(&self, query: &str, topic_key: &str) -> RagContext {
        let profile = self.profile(topic_key);
        let expanded = self.with_profile_keywords(query, &profile);

        let options = ContextOptions {
            top_k: profile.top_k,
            max_tokens: profile.max_tokens,
            min_score: self.config.min_score,
            topic: None,
        };

        self.get_context(&expanded, &options).await
    }

    /// Context for a free-text query
    pub async fn get_context(&self, query: &str, options: &ContextOptions) -> RagContext {
        match self.engine.build_context(query, options).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!("Context assembly failed for '{}', continuing without grounding: {}", query, e);
                RagContext::empty()
            }
        }
    }

    /// Context for cited structured codes: exact, parent and keyword lookups
    pub async fn get_code_context(&self, codes: &[String]) -> RagContext {
        let per_code = join_all(codes.iter().map(|code| self.code_results(code))).await;
        let mut results = dedup_by_chunk(per_code.into_iter().flatten().collect());
        results.truncate(self.config.code_context_limit);
        RagContext::from_results(results)
    }

    async fn code_results(&self, code: &str) -> Vec<RetrievalResult> {
        let mut results = Vec::new();

        match self.engine.retrieve_by_code(code).await {
            Ok(exact) => results.extend(exact),
            Err(e) => tracing::warn!("Code lookup for {} failed: {}", code, e),
        }

        if let Some(parent) = parent_code(code) {
            match self.engine.retrieve_by_code(&parent).await {
                Ok(found) => results.extend(found.into_iter().map(|r| r.decayed(self.config.parent_code_decay))),
                Err(e) => tracing::warn!("Parent code lookup for {} failed: {}", parent, e),
            }
        }

        let keywords: Vec<String> = self
            .tables
            .code_keywords_for(code)
            .iter()
            .take(self.config.max_code_keywords)
            .cloned()
            .collect();

        let options = self.engine.default_options().with_min_score(self.config.min_score);
        let queries: Vec<RetrievalQuery> = keywords
            .iter()
            .map(|k| RetrievalQuery::with_options(k.clone(), options.clone()))
            .collect();
        let lookups = join_all(queries.iter().map(|q| self.engine.retrieve(q))).await;

        for (keyword, lookup) in keywords.iter().zip(lookups) {
            match lookup {
                Ok(found) => results.extend(found.into_iter().map(|r| r.decayed(self.config.code_keyword_decay))),
                Err(e) => tracing::warn!("Keyword lookup '{}' for code {} failed: {}", keyword, code, e),
            }
        }

        results
    }

    /// Context used to verify domain terms from an answer
    pub async fn get_term_verification_context(&self, terms: &[String]) -> RagContext {
        match self.try_term_verification_context(terms).await {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!("Term verification context unavailable: {}", e);
                RagContext::empty()
            }
        }
    }

    /// Like `get_term_verification_context`, but errors when every term
    /// lookup failed so callers can tell an outage from missing terms
    pub async fn try_term_verification_context(&self, terms: &[String]) -> Result<RagContext> {
        let terms: Vec<&String> = terms.iter().take(self.config.max_verification_terms).collect();
        let options = RetrievalOptions::default()
            .with_top_k(self.config.term_top_k)
            .with_min_score(self.config.term_min_score);

        let queries: Vec<RetrievalQuery> = terms
            .iter()
            .map(|t| RetrievalQuery::with_options(t.as_str(), options.clone()))
            .collect();
        let lookups = join_all(queries.iter().map(|q| self.engine.retrieve(q))).await;

        let mut results = Vec::new();
        let mut succeeded = 0usize;
        let mut last_error = None;
        for (term, lookup) in terms.iter().zip(lookups) {
            match lookup {
                Ok(found) => {
                    succeeded += 1;
                    results.extend(found);
                }
                Err(e) => {
                    tracing::warn!("Term lookup '{}' failed: {}", term, e);
                    last_error = Some(e);
                }
            }
        }

        if succeeded == 0 {
            if let Some(e) = last_error {
                return Err(e);
            }
        }

        Ok(RagContext::within_budget(
            dedup_by_chunk(results),
            self.config.term_context_max_tokens,
            usize::MAX,
        ))
    }

    fn with_profile_keywords(&self, query: &str, profile: &TopicProfile) -> String {
        let lower = query.to_lowercase();
        let additions: Vec<&str> = profile
            .keywords
            .iter()
            .filter(|k| !lower.contains(&k.to_lowercase()))
            .take(self.config.max_profile_keywords)
            .map(String::as_str)
            .collect();

        if additions.is_empty() {
            query.to_string()
        } else {
            format!("{} {}", query, additions.join(" "))
        }
    }
}
