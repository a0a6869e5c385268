//! Domain knowledge: structured codes, token estimation, normalization and
//! the versioned lookup tables

pub mod codes;
pub mod normalize;
pub mod tables;
pub mod tokens;

pub use normalize::QueryNormalizer;
pub use tables::{DomainTables, SynonymGroup, TopicProfile};
pub use tokens::TokenEstimator;
