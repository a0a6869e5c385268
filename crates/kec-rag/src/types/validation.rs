//! Answer validation result types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Verified vs. unverified claims of one category
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CategoryValidation {
    pub verified: Vec<String>,
    pub unverified: Vec<String>,
}

impl CategoryValidation {
    /// Total claims in this category
    pub fn total(&self) -> usize {
        self.verified.len() + self.unverified.len()
    }
}

/// Suggested correction for a term that was not found verbatim
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TermCorrection {
    /// Term as written in the answer
    pub term: String,
    /// Closest word found in the corpus
    pub suggestion: String,
    /// Jaccard character-set similarity
    pub similarity: f32,
}

/// Term check outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TermValidation {
    /// Terms found verbatim in the verification context
    pub verified: Vec<String>,
    /// Terms with neither a verbatim match nor a near miss
    pub unverified: Vec<String>,
    /// Near misses offered as corrections
    pub corrections: Vec<TermCorrection>,
    /// Terms whose lookup failed; neither verified nor unverified
    #[serde(default)]
    pub unchecked: Vec<String>,
}

/// Stage of the multi-stage code search that verified a citation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStage {
    Exact,
    Parent,
    Topic,
    Keyword,
}

impl VerificationStage {
    /// Stages in priority order
    pub const ORDER: [VerificationStage; 4] = [Self::Exact, Self::Parent, Self::Topic, Self::Keyword];
}

/// A code citation that was verified against the corpus
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeVerification {
    /// Citation as written in the answer
    pub citation: String,
    /// Normalized code
    pub code: String,
    /// Stage that succeeded
    pub stage: VerificationStage,
    /// Stage score after decay
    pub score: f32,
    /// Best supporting chunk
    pub chunk_id: Uuid,
}

/// Code check outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CodeValidation {
    pub verified: Vec<CodeVerification>,
    /// Citations no stage could verify (for this answer only)
    pub invalid: Vec<String>,
}

impl CodeValidation {
    /// Total citations checked
    pub fn total(&self) -> usize {
        self.verified.len() + self.invalid.len()
    }
}

/// Full validation outcome for one answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    /// No unverified terms and hallucination score below threshold
    pub is_valid: bool,
    pub term_validation: TermValidation,
    pub code_validation: CodeValidation,
    pub formula_validation: CategoryValidation,
    /// Estimated share of claims not traceable to the corpus, in [0, 1]
    pub hallucination_score: f32,
    /// Overall trust score, in [0, 1]
    pub confidence: f32,
    /// Improvement suggestions
    pub suggestions: Vec<String>,
    /// Non-fatal findings
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Permissive default used when verification could not run
    pub fn permissive(confidence: f32, warning: impl Into<String>) -> Self {
        Self {
            is_valid: true,
            term_validation: TermValidation::default(),
            code_validation: CodeValidation::default(),
            formula_validation: CategoryValidation::default(),
            hallucination_score: 0.0,
            confidence: confidence.clamp(0.0, 1.0),
            suggestions: Vec::new(),
            warnings: vec![warning.into()],
        }
    }
}
