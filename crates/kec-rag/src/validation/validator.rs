//! Answer validation against the reference corpus.
//!
//! Terms, code citations and formulas are checked concurrently. Code
//! citations go through a staged search (exact, parent, topic label, code
//! keywords) that stops at the first stage that finds support. Any failure
//! of the validator itself degrades to a permissive result with a warning.

use futures::future::join_all;
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::config::ValidationConfig;
use crate::domain::codes::{normalize_code, parent_code, topic_label};
use crate::error::{Error, Result};
use crate::generation::ContextAssembler;
use crate::retrieval::ContextOptions;
use crate::types::{
    CategoryValidation, CodeValidation, CodeVerification, RetrievalQuery, RetrievalResult, TermCorrection,
    TermValidation, ValidationResult, VerificationStage,
};

use super::extract::{code_citations, AnswerClaims, ClaimExtractor};
use super::scoring::{score, CategoryCounts, ClaimCounts};
use super::similarity::find_near_miss;

static LATIN_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z]{2,}").expect("valid regex"));

static HANGUL_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[가-힣]{2,}").expect("valid regex"));

static ANY_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+").expect("valid regex"));

static NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+(?:[.,]\d+)?").expect("valid regex"));

/// What the caller knows about the answer being validated
#[derive(Debug, Clone, Default)]
pub struct ValidationContext {
    /// Question the answer responds to
    pub question: String,
    /// Pre-extracted claims; extracted from the answer text when absent
    pub claims: Option<AnswerClaims>,
    /// The generator's self-reported confidence
    pub generator_confidence: Option<f32>,
}

impl ValidationContext {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            ..Default::default()
        }
    }

    pub fn with_claims(mut self, claims: AnswerClaims) -> Self {
        self.claims = Some(claims);
        self
    }

    pub fn with_generator_confidence(mut self, confidence: f32) -> Self {
        self.generator_confidence = Some(confidence);
        self
    }
}

/// Supporting evidence found by one code stage
struct StageHit {
    score: f32,
    chunk_id: Uuid,
}

/// Validates generated answers against the corpus
pub struct AnswerValidator {
    assembler: Arc<ContextAssembler>,
    extractor: ClaimExtractor,
    config: ValidationConfig,
}

impl AnswerValidator {
    pub fn new(assembler: Arc<ContextAssembler>, config: ValidationConfig) -> Self {
        let extractor = ClaimExtractor::new(assembler.tables().clone(), config.max_terms);
        Self {
            assembler,
            extractor,
            config,
        }
    }

    /// Validate an answer; never fails
    pub async fn validate(&self, answer: &str, context: &ValidationContext) -> ValidationResult {
        let run = self.try_validate(answer, context);

        let outcome = match self.config.timeout_ms {
            Some(ms) => match tokio::time::timeout(Duration::from_millis(ms), run).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Error::validation(format!("timed out after {} ms", ms))),
            },
            None => run.await,
        };

        match outcome {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Answer validation could not run, accepting answer: {}", e);
                ValidationResult::permissive(
                    context.generator_confidence.unwrap_or(1.0),
                    format!("Verification could not run: {}", e),
                )
            }
        }
    }

    /// Validation that surfaces its own failures
    pub async fn try_validate(&self, answer: &str, context: &ValidationContext) -> Result<ValidationResult> {
        let claims = match &context.claims {
            Some(claims) => claims.sanitized()?,
            None => self.extractor.extract(answer),
        };

        tracing::debug!(
            "Validating answer: {} terms, {} codes, {} formulas",
            claims.terms.len(),
            claims.codes.len(),
            claims.formulas.len()
        );

        let (terms, codes, formulas) = tokio::join!(
            self.check_terms(&claims.terms),
            self.check_codes(&claims.codes),
            self.check_formulas(&context.question, &claims.formulas),
        );
        let term_validation = terms?;
        let code_validation = codes?;
        let (formula_validation, mut warnings) = formulas?;

        let counts = ClaimCounts {
            terms: CategoryCounts::new(term_validation.verified.len(), term_validation.unverified.len()),
            codes: CategoryCounts::new(code_validation.verified.len(), code_validation.invalid.len()),
            formulas: CategoryCounts::new(formula_validation.verified.len(), formula_validation.unverified.len()),
        };
        let scores = score(&counts, &self.config.weights);

        let mut suggestions = Vec::new();
        for correction in &term_validation.corrections {
            suggestions.push(format!(
                "'{}' may be '{}' (similarity {:.2})",
                correction.term, correction.suggestion, correction.similarity
            ));
        }
        for citation in &code_validation.invalid {
            suggestions.push(format!(
                "Citation '{}' could not be verified against the reference corpus",
                citation
            ));
        }
        for term in &term_validation.unverified {
            suggestions.push(format!("Term '{}' was not found in the reference corpus", term));
        }

        if !term_validation.unchecked.is_empty() {
            warnings.push(format!(
                "{} term(s) could not be checked: {}",
                term_validation.unchecked.len(),
                term_validation.unchecked.join(", ")
            ));
        }
        if self.missing_units(answer) {
            warnings.push("Answer states numeric values without SI units".to_string());
        }
        if let Some(confidence) = context.generator_confidence {
            if confidence < self.config.min_generator_confidence {
                warnings.push(format!("Generator reported low confidence ({:.2})", confidence));
            }
        }

        let is_valid = term_validation.unverified.is_empty() && scores.hallucination < self.config.hallucination_threshold;

        tracing::debug!(
            "Validation done: valid={}, hallucination={:.2}, confidence={:.2}",
            is_valid,
            scores.hallucination,
            scores.confidence
        );

        Ok(ValidationResult {
            is_valid,
            term_validation,
            code_validation,
            formula_validation,
            hallucination_score: scores.hallucination,
            confidence: scores.confidence,
            suggestions,
            warnings,
        })
    }

    /// Terms are looked up in batches the size of one verification context,
    /// and each term is checked against the context built for its batch
    async fn check_terms(&self, terms: &[String]) -> Result<TermValidation> {
        let mut validation = TermValidation::default();
        if terms.is_empty() {
            return Ok(validation);
        }

        let batches: Vec<&[String]> = terms.chunks(self.assembler.max_verification_terms()).collect();
        let contexts = join_all(
            batches
                .iter()
                .map(|batch| self.assembler.try_term_verification_context(batch)),
        )
        .await;

        let mut checked_any = false;
        let mut last_error = None;
        for (batch, context) in batches.iter().zip(contexts) {
            let context = match context {
                Ok(context) => context,
                Err(e) => {
                    tracing::warn!("Term batch of {} could not be checked: {}", batch.len(), e);
                    validation.unchecked.extend(batch.iter().cloned());
                    last_error = Some(e);
                    continue;
                }
            };
            checked_any = true;

            for term in batch.iter() {
                if context.contains_text(term) {
                    validation.verified.push(term.clone());
                    continue;
                }

                let texts = context.results.iter().map(|r| r.chunk.content.as_str());
                match find_near_miss(term, texts, self.config.similarity_threshold) {
                    Some((suggestion, similarity)) => validation.corrections.push(TermCorrection {
                        term: term.clone(),
                        suggestion,
                        similarity,
                    }),
                    None => validation.unverified.push(term.clone()),
                }
            }
        }

        match last_error {
            Some(e) if !checked_any => Err(e),
            _ => Ok(validation),
        }
    }

    async fn check_codes(&self, citations: &[String]) -> Result<CodeValidation> {
        let outcomes = join_all(citations.iter().map(|c| self.verify_code(c))).await;

        let mut validation = CodeValidation::default();
        for (citation, outcome) in citations.iter().zip(outcomes) {
            match outcome? {
                Some(verification) => validation.verified.push(verification),
                None => validation.invalid.push(citation.clone()),
            }
        }
        Ok(validation)
    }

    /// Staged search for one citation; `None` when no stage finds support.
    ///
    /// Errors only when every stage that ran failed.
    pub async fn verify_code(&self, citation: &str) -> Result<Option<CodeVerification>> {
        let Some(code) = normalize_code(citation) else {
            return Ok(None);
        };

        let mut completed = false;
        let mut last_error = None;

        for stage in VerificationStage::ORDER {
            let outcome = match stage {
                VerificationStage::Exact => self.exact_stage(citation, &code).await,
                VerificationStage::Parent => self.parent_stage(&code).await,
                VerificationStage::Topic => self.topic_stage(citation).await,
                VerificationStage::Keyword => self.keyword_stage(&code).await,
            };

            match outcome {
                Ok(Some(hit)) => {
                    tracing::debug!("[{}] verified at {:?} stage ({:.2})", code, stage, hit.score);
                    return Ok(Some(CodeVerification {
                        citation: citation.to_string(),
                        code,
                        stage,
                        score: hit.score,
                        chunk_id: hit.chunk_id,
                    }));
                }
                Ok(None) => completed = true,
                Err(e) => {
                    tracing::warn!("[{}] {:?} stage failed: {}", code, stage, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if !completed => Err(e),
            _ => Ok(None),
        }
    }

    async fn exact_stage(&self, citation: &str, code: &str) -> Result<Option<StageHit>> {
        let literal = citation.trim();
        let mut candidates = vec![literal];
        if literal != code {
            candidates.push(code);
        }

        let mut best: Option<StageHit> = None;
        for candidate in candidates {
            let results = self.assembler.engine().retrieve_by_code(candidate).await?;
            if let Some(hit) = self.top_hit(&results, 1.0) {
                if best.as_ref().map_or(true, |b| hit.score > b.score) {
                    best = Some(hit);
                }
            }
        }
        Ok(best)
    }

    async fn parent_stage(&self, code: &str) -> Result<Option<StageHit>> {
        let Some(parent) = parent_code(code) else {
            return Ok(None);
        };
        let results = self.assembler.engine().retrieve_by_code(&parent).await?;
        Ok(self.top_hit(&results, self.config.parent_decay))
    }

    async fn topic_stage(&self, citation: &str) -> Result<Option<StageHit>> {
        let Some(label) = topic_label(citation) else {
            return Ok(None);
        };
        let results = self.free_text_lookup(&label).await?;
        Ok(self.top_hit(&results, self.config.topic_decay))
    }

    async fn keyword_stage(&self, code: &str) -> Result<Option<StageHit>> {
        let keywords: Vec<&str> = self
            .assembler
            .tables()
            .code_keywords_for(code)
            .iter()
            .take(self.config.max_stage_keywords)
            .map(String::as_str)
            .collect();
        if keywords.is_empty() {
            return Ok(None);
        }

        let results = self.free_text_lookup(&keywords.join(" ")).await?;
        Ok(self.top_hit(&results, self.config.keyword_decay))
    }

    async fn free_text_lookup(&self, text: &str) -> Result<Vec<RetrievalResult>> {
        let engine = self.assembler.engine();
        let options = engine.default_options().with_min_score(self.config.stage_min_score);
        engine.retrieve(&RetrievalQuery::with_options(text, options)).await
    }

    /// Best result if its raw score clears the stage minimum, decayed
    fn top_hit(&self, results: &[RetrievalResult], decay: f32) -> Option<StageHit> {
        results
            .iter()
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .filter(|r| r.score >= self.config.exact_min_score)
            .map(|r| StageHit {
                score: (r.score * decay).clamp(0.0, 1.0),
                chunk_id: r.chunk.id,
            })
    }

    async fn check_formulas(
        &self,
        question: &str,
        formulas: &[String],
    ) -> Result<(CategoryValidation, Vec<String>)> {
        let lookups = join_all(formulas.iter().map(|f| self.formula_supported(question, f))).await;

        let mut validation = CategoryValidation::default();
        let mut warnings = Vec::new();
        for (formula, supported) in formulas.iter().zip(lookups) {
            if supported? {
                validation.verified.push(formula.clone());
            } else {
                warnings.push(format!("Formula '{}' was not found in the reference material", formula));
                validation.unverified.push(formula.clone());
            }
        }
        Ok((validation, warnings))
    }

    async fn formula_supported(&self, question: &str, formula: &str) -> Result<bool> {
        let tokens = formula_tokens(formula);
        if tokens.is_empty() {
            return Ok(false);
        }

        let options = ContextOptions {
            top_k: self.assembler.engine().default_options().top_k,
            max_tokens: self.config.formula_context_tokens,
            min_score: self.config.stage_min_score,
            topic: None,
        };
        let query = format!("{} {}", question, tokens.join(" "));
        let context = self.assembler.engine().build_context(query.trim(), &options).await?;

        Ok(tokens.iter().any(|t| context.contains_text(t)))
    }

    /// Numbers present outside code citations, none followed by a known unit
    fn missing_units(&self, answer: &str) -> bool {
        let mut text = answer.to_string();
        for citation in code_citations(answer) {
            text = text.replace(citation.as_str(), " ");
        }

        let units = &self.assembler.tables().si_units;
        let mut numbers = 0;
        for m in NUMBER.find_iter(&text) {
            numbers += 1;
            let rest = text[m.end()..].trim_start();
            if units.iter().any(|u| rest.starts_with(u.as_str())) {
                return false;
            }
        }
        numbers > 0
    }
}

/// Hangul and Latin word tokens of a formula, or every token when it has none
fn formula_tokens(formula: &str) -> Vec<String> {
    let mut tokens: Vec<String> = Vec::new();
    for m in LATIN_TOKEN.find_iter(formula).chain(HANGUL_TOKEN.find_iter(formula)) {
        if !tokens.iter().any(|t| t == m.as_str()) {
            tokens.push(m.as_str().to_string());
        }
    }

    if tokens.is_empty() {
        tokens = ANY_TOKEN.find_iter(formula).map(|m| m.as_str().to_string()).collect();
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ContextConfig, EmbeddingConfig, RetrievalConfig};
    use crate::domain::TokenEstimator;
    use crate::embeddings::EmbeddingService;
    use crate::providers::EmbeddingProvider;
    use crate::retrieval::RetrievalEngine;
    use crate::test_support::{corpus_engine, corpus_store, failing_engine, selectively_failing_engine, tables, DIMENSIONS};
    use async_trait::async_trait;

    async fn validator() -> AnswerValidator {
        let (engine, _) = corpus_engine().await;
        let assembler = Arc::new(ContextAssembler::new(engine, tables(), ContextConfig::default()));
        AnswerValidator::new(assembler, ValidationConfig::default())
    }

    fn terms_only(terms: &[&str]) -> AnswerClaims {
        AnswerClaims {
            terms: terms.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_formula_tokens() {
        assert_eq!(formula_tokens("Qc = P(tanθ1 - tanθ2)"), vec!["Qc", "tan"]);
        assert_eq!(formula_tokens("조도 = 광속 / 면적"), vec!["조도", "광속", "면적"]);
        assert_eq!(formula_tokens("1 = 2"), vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_parent_stage_for_missing_subclause() {
        let validator = validator().await;
        let verification = validator.verify_code("KEC 230.2").await.unwrap().unwrap();

        assert_eq!(verification.code, "230.2");
        assert_eq!(verification.stage, VerificationStage::Parent);
        assert!((verification.score - 0.9).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_exact_stage_preferred_when_it_succeeds() {
        let validator = validator().await;
        for citation in ["142.2", "KEC 142.6 (공통접지)", "KEC 230", "232.5"] {
            let verification = validator.verify_code(citation).await.unwrap().unwrap();
            assert_eq!(verification.stage, VerificationStage::Exact, "{}", citation);
            assert_eq!(verification.score, 1.0);
        }
    }

    #[tokio::test]
    async fn test_topic_stage_uses_label() {
        let validator = validator().await;
        let verification = validator.verify_code("999.1 (조명설비 조도)").await.unwrap().unwrap();
        assert_eq!(verification.stage, VerificationStage::Topic);
        assert!(verification.score <= 0.85);
    }

    #[tokio::test]
    async fn test_unsupported_code_is_invalid_not_error() {
        let validator = validator().await;
        assert!(validator.verify_code("999.9").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_two_of_three_terms_verified() {
        let validator = validator().await;
        let context = ValidationContext::new("접지저항 계산").with_claims(terms_only(&["접지저항", "접지극", "피뢰침설비"]));

        let result = validator.validate("", &context).await;

        assert_eq!(result.term_validation.verified.len(), 2);
        assert_eq!(result.term_validation.unverified, vec!["피뢰침설비"]);
        assert!((result.hallucination_score - 0.5).abs() < 1e-6);
        assert!(!result.is_valid);
        assert!(result.suggestions.iter().any(|s| s.contains("피뢰침설비")));
    }

    #[tokio::test]
    async fn test_terms_past_one_context_are_still_looked_up() {
        let validator = validator().await;
        let terms = [
            "접지저항",
            "접지극",
            "공통접지",
            "등전위본딩",
            "접지시스템",
            "통합접지",
            "매설",
            "접지",
            "부등률",
            "수용률",
        ];
        let context = ValidationContext::new("변압기 용량").with_claims(terms_only(&terms));

        let result = validator.validate("", &context).await;

        let verified = &result.term_validation.verified;
        assert!(verified.contains(&"부등률".to_string()), "{:?}", result.term_validation);
        assert!(verified.contains(&"수용률".to_string()), "{:?}", result.term_validation);
        assert!(!result.term_validation.unverified.iter().any(|t| t == "부등률" || t == "수용률"));
        assert!(result.term_validation.unchecked.is_empty());
    }

    #[tokio::test]
    async fn test_failed_term_batch_is_unchecked_not_unverified() {
        let assembler = Arc::new(ContextAssembler::new(
            selectively_failing_engine("부등률").await,
            tables(),
            ContextConfig {
                max_verification_terms: 1,
                ..Default::default()
            },
        ));
        let validator = AnswerValidator::new(assembler, ValidationConfig::default());
        let context = ValidationContext::new("변압기").with_claims(terms_only(&["수용률", "부등률"]));

        let result = validator.validate("", &context).await;

        assert_eq!(result.term_validation.verified, vec!["수용률"]);
        assert_eq!(result.term_validation.unchecked, vec!["부등률"]);
        assert!(result.term_validation.unverified.is_empty());
        assert!(result.is_valid);
        assert!(result.warnings.iter().any(|w| w.contains("could not be checked")));
    }

    #[tokio::test]
    async fn test_near_miss_becomes_correction() {
        let validator = validator().await;
        let context = ValidationContext::new("접지저항").with_claims(terms_only(&["접지저항", "접지저항값"]));

        let result = validator.validate("", &context).await;

        assert!(result.term_validation.unverified.is_empty());
        assert_eq!(result.term_validation.corrections.len(), 1);
        assert_eq!(result.term_validation.corrections[0].suggestion, "접지저항");
        assert!(result.is_valid);
    }

    #[tokio::test]
    async fn test_invalid_code_alone_keeps_validity() {
        let validator = validator().await;
        let claims = AnswerClaims {
            terms: vec!["접지저항".to_string(), "접지극".to_string()],
            codes: vec!["KEC 142.2".to_string(), "999.9".to_string()],
            formulas: Vec::new(),
        };
        let result = validator
            .validate("", &ValidationContext::new("접지극").with_claims(claims))
            .await;

        assert_eq!(result.code_validation.invalid, vec!["999.9"]);
        // 0.4 * 0.5 / 0.7
        assert!((result.hallucination_score - 0.2 / 0.7).abs() < 1e-6);
        assert!(result.is_valid);
        assert!(result.confidence < 1.0);
        assert!(result.suggestions.iter().any(|s| s.contains("999.9")));
    }

    #[tokio::test]
    async fn test_full_answer_extraction() {
        let validator = validator().await;
        let answer = "KEC 142.6 (공통접지)에 따라 등전위본딩을 하고 접지시스템을 공용한다.\n\
            Qc = P(tanθ1 - tanθ2)";
        let result = validator
            .validate(answer, &ValidationContext::new("공통접지 역률 개선").with_generator_confidence(0.9))
            .await;

        assert_eq!(result.code_validation.verified.len(), 1);
        assert_eq!(result.code_validation.verified[0].stage, VerificationStage::Exact);
        assert_eq!(result.formula_validation.verified.len(), 1);
        assert!((0.0..=1.0).contains(&result.confidence));
        assert!(!result.warnings.iter().any(|w| w.contains("low confidence")));
    }

    #[tokio::test]
    async fn test_unit_warning() {
        let validator = validator().await;
        let context = ValidationContext::new("접지극 매설").with_claims(AnswerClaims::default());

        let result = validator.validate("접지극은 0.75 이상 깊이에 매설한다.", &context).await;
        assert!(result.warnings.iter().any(|w| w.contains("SI units")));

        let result = validator.validate("접지극은 0.75 m 이상 깊이에 매설한다.", &context).await;
        assert!(!result.warnings.iter().any(|w| w.contains("SI units")));

        let result = validator.validate("KEC 142.2 를 따른다.", &context).await;
        assert!(result.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_low_generator_confidence_warning() {
        let validator = validator().await;
        let context = ValidationContext::new("조명")
            .with_claims(AnswerClaims::default())
            .with_generator_confidence(0.5);

        let result = validator.validate("조명 설계", &context).await;
        assert!(result.warnings.iter().any(|w| w.contains("low confidence")));
        assert_eq!(result.confidence, 1.0);
        assert!(result.is_valid);
    }

    #[tokio::test]
    async fn test_fails_open_when_retrieval_is_down() {
        let assembler = Arc::new(ContextAssembler::new(failing_engine().await, tables(), ContextConfig::default()));
        let validator = AnswerValidator::new(assembler, ValidationConfig::default());
        let context = ValidationContext::new("조도")
            .with_claims(terms_only(&["조도", "광속법"]))
            .with_generator_confidence(0.8);

        let result = validator.validate("", &context).await;

        assert!(result.is_valid);
        assert_eq!(result.confidence, 0.8);
        assert_eq!(result.hallucination_score, 0.0);
        assert!(result.warnings[0].starts_with("Verification could not run"));
    }

    #[tokio::test]
    async fn test_malformed_claims_fail_open() {
        let validator = validator().await;
        let context = ValidationContext::new("조도").with_claims(terms_only(&[""]));

        let result = validator.validate("", &context).await;
        assert!(result.is_valid);
        assert!(result.warnings[0].contains("empty term claim"));
    }

    struct SlowProvider;

    #[async_trait]
    impl EmbeddingProvider for SlowProvider {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            Ok(vec![0.0; DIMENSIONS])
        }

        fn dimensions(&self) -> usize {
            DIMENSIONS
        }

        async fn health_check(&self) -> Result<bool> {
            Ok(true)
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_permissive() {
        let embeddings = Arc::new(EmbeddingService::new(
            Arc::new(SlowProvider),
            EmbeddingConfig {
                dimensions: DIMENSIONS,
                ..Default::default()
            },
            TokenEstimator::default(),
        ));
        let engine = Arc::new(RetrievalEngine::new(
            corpus_store().await,
            embeddings,
            &tables(),
            RetrievalConfig::default(),
        ));
        let assembler = Arc::new(ContextAssembler::new(engine, tables(), ContextConfig::default()));
        let config = ValidationConfig {
            timeout_ms: Some(50),
            ..Default::default()
        };
        let validator = AnswerValidator::new(assembler, config);

        let result = validator
            .validate("", &ValidationContext::new("조도").with_claims(terms_only(&["조도"])))
            .await;

        assert!(result.is_valid);
        assert!(result.warnings[0].contains("timed out"));
    }
}
