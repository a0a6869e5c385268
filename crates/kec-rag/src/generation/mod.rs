//! Context assembly, prompt rendering and generator output parsing

pub mod context;
pub mod parser;
pub mod prompt;

pub use context::ContextAssembler;
pub use parser::{parse_structured, AnswerStep, GeneratedAnswer, ParseOutcome, ParseStrategy};
pub use prompt::PromptBuilder;
