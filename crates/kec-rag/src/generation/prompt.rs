//! Prompt rendering for grounded answer generation

use crate::types::{ChunkSource, RagContext, RetrievalResult};

/// Prompt builder for RAG queries
pub struct PromptBuilder;

impl PromptBuilder {
    /// Citation-annotated context block, one `[ref i]` entry per result
    pub fn build_context(results: &[RetrievalResult]) -> String {
        results
            .iter()
            .enumerate()
            .map(|(i, result)| {
                format!(
                    "[ref {}] {}: {}",
                    i + 1,
                    Self::format_source_ref(&result.chunk.source),
                    result.chunk.content.trim()
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// "document – section", or just the document name
    fn format_source_ref(source: &ChunkSource) -> String {
        match source.section_title() {
            Some(section) => format!("{} – {}", source.document_name, section),
            None => source.document_name.clone(),
        }
    }

    /// Full prompt with grounding rules for the answer generator
    pub fn build_rag_prompt(question: &str, context: &RagContext) -> String {
        if context.is_empty() {
            return format!(
                r#"No reference material was found for this question. Answer from general knowledge and state clearly that the answer is not grounded in KEC documents.

QUESTION: {question}"#,
                question = question
            );
        }

        format!(
            r#"You are an electrical engineering assistant that answers from the provided reference material.

GROUNDING RULES:
1. Use only information stated in the CONTEXT below
2. Cite every regulation, formula and value with its reference marker, e.g. [ref 2]
3. Quote KEC clause numbers exactly as they appear in the context
4. Give calculations step by step with SI units
5. If the context does not cover the question, say so instead of guessing

CONTEXT:
{context}

SOURCES: {sources}

QUESTION: {question}"#,
            context = context.formatted,
            sources = context.sources.join(", "),
            question = question
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Chunk, MatchType};
    use uuid::Uuid;

    fn result(document: &str, heading: Option<&str>, content: &str) -> RetrievalResult {
        let source = ChunkSource {
            document_name: document.to_string(),
            heading_path: heading.map(|h| vec!["제1장".to_string(), h.to_string()]).unwrap_or_default(),
            ..Default::default()
        };
        let chunk = Chunk::new(Uuid::new_v4(), 0, content.to_string(), 10, source);
        RetrievalResult::new(chunk, 0.8, MatchType::Hybrid)
    }

    #[test]
    fn test_build_context_format() {
        let context = PromptBuilder::build_context(&[
            result("KEC 해설", Some("142.6 공통접지"), "공통접지를 적용한다."),
            result("공식집", None, "Qc = P(tanθ1 - tanθ2)"),
        ]);

        assert_eq!(
            context,
            "[ref 1] KEC 해설 – 142.6 공통접지: 공통접지를 적용한다.\n\n[ref 2] 공식집: Qc = P(tanθ1 - tanθ2)"
        );
        assert!(PromptBuilder::build_context(&[]).is_empty());
    }

    #[test]
    fn test_rag_prompt_mentions_sources() {
        let context = RagContext::from_results(vec![result("KEC 해설", Some("230 조명"), "조도 기준")]);
        let prompt = PromptBuilder::build_rag_prompt("조도 기준은?", &context);
        assert!(prompt.contains("[ref 1] KEC 해설 – 230 조명: 조도 기준"));
        assert!(prompt.contains("SOURCES: KEC 해설"));

        let empty = PromptBuilder::build_rag_prompt("조도 기준은?", &RagContext::empty());
        assert!(empty.contains("not grounded"));
    }
}
