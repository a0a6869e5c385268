//! Answer validation: claim extraction, corpus checks and scoring

pub mod extract;
pub mod scoring;
pub mod similarity;
pub mod validator;

pub use extract::{AnswerClaims, ClaimExtractor};
pub use scoring::{score, CategoryCounts, ClaimCounts, Scores};
pub use validator::{AnswerValidator, ValidationContext};
