//! Sentence-aware chunking that keeps structured codes intact

use std::sync::Arc;
use uuid::Uuid;

use crate::config::ChunkingConfig;
use crate::domain::codes::extract_codes;
use crate::domain::{DomainTables, TokenEstimator};
use crate::types::{Chunk, ChunkSource};

use super::sections::Section;

/// Stand-in for a dot between two digits while sentences are split
const DOT_MASK: char = '\u{E000}';

/// Sentence terminators
const TERMINATORS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

/// Per-document information attached to every chunk
#[derive(Debug, Clone)]
pub struct ChunkMeta {
    /// Owning document
    pub document_id: Uuid,
    /// Citation source (heading path is filled per section)
    pub source: ChunkSource,
    /// Topic category from document metadata; inferred per chunk when absent
    pub topic: Option<String>,
}

/// Chunk text before enrichment
struct PackedChunk {
    content: String,
    overlap_len: usize,
}

/// Text chunker with a token budget and sentence overlap
pub struct Chunker {
    config: ChunkingConfig,
    estimator: TokenEstimator,
    tables: Arc<DomainTables>,
}

impl Chunker {
    /// Create a new chunker
    pub fn new(config: ChunkingConfig, tables: Arc<DomainTables>) -> Self {
        let estimator = TokenEstimator::from_config(&config);
        Self {
            config,
            estimator,
            tables,
        }
    }

    /// Token estimator used for budgeting
    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    /// Chunk raw text with the configured chunk size
    pub fn chunk(&self, text: &str, meta: &ChunkMeta) -> Vec<Chunk> {
        self.chunk_with_size(text, meta, &meta.source.heading_path, self.config.chunk_size, 0)
    }

    /// Chunk pre-segmented sections.
    ///
    /// A section that fits the chunk budget becomes one chunk; larger sections
    /// are split with the section size for the document type.
    pub fn chunk_sections(&self, sections: &[Section], meta: &ChunkMeta) -> Vec<Chunk> {
        let mut chunks: Vec<Chunk> = Vec::new();

        for section in sections {
            let content = section.content.trim();
            if content.is_empty() {
                continue;
            }

            let start_index = chunks.len() as u32;
            if self.estimator.estimate(content) <= self.config.chunk_size {
                chunks.push(self.finish_chunk(
                    PackedChunk {
                        content: content.to_string(),
                        overlap_len: 0,
                    },
                    start_index,
                    meta,
                    &section.heading_path,
                ));
            } else {
                let size = self.config.section_chunk_size(meta.source.doc_type);
                tracing::debug!(
                    "Section {:?} exceeds {} tokens, splitting at {}",
                    section.heading_path.last(),
                    self.config.chunk_size,
                    size
                );
                chunks.extend(self.chunk_with_size(content, meta, &section.heading_path, size, start_index));
            }
        }

        chunks
    }

    fn chunk_with_size(
        &self,
        text: &str,
        meta: &ChunkMeta,
        heading_path: &[String],
        chunk_size: usize,
        start_index: u32,
    ) -> Vec<Chunk> {
        let sentences = split_sentences(text);
        self.pack(sentences, chunk_size)
            .into_iter()
            .enumerate()
            .map(|(i, packed)| self.finish_chunk(packed, start_index + i as u32, meta, heading_path))
            .collect()
    }

    /// Greedily pack sentences into chunks, carrying a sentence suffix of at
    /// most `chunk_overlap` tokens into the next chunk
    fn pack(&self, sentences: Vec<String>, chunk_size: usize) -> Vec<PackedChunk> {
        let mut packed = Vec::new();
        let mut buffer: Vec<String> = Vec::new();
        let mut carried = 0usize;

        for sentence in sentences {
            if buffer.len() > carried {
                let candidate = joined_with(&buffer, &sentence);
                if self.estimator.estimate(&candidate) > chunk_size {
                    packed.push(emit(&buffer, carried));

                    let mut overlap = self.overlap_suffix(&buffer);
                    if !overlap.is_empty() && self.estimator.estimate(&joined_with(&overlap, &sentence)) > chunk_size {
                        overlap.clear();
                    }
                    carried = overlap.len();
                    buffer = overlap;
                }
            }
            buffer.push(sentence);
        }

        if buffer.len() > carried {
            packed.push(emit(&buffer, carried));
        }

        packed
    }

    /// Longest sentence suffix whose estimate fits the overlap budget
    fn overlap_suffix(&self, buffer: &[String]) -> Vec<String> {
        let mut take = 0usize;
        for n in 1..=buffer.len() {
            let suffix = buffer[buffer.len() - n..].join(" ");
            if self.estimator.estimate(&suffix) > self.config.chunk_overlap {
                break;
            }
            take = n;
        }
        buffer[buffer.len() - take..].to_vec()
    }

    fn finish_chunk(&self, packed: PackedChunk, index: u32, meta: &ChunkMeta, heading_path: &[String]) -> Chunk {
        let token_count = self.estimator.estimate(&packed.content);
        let source = meta.source.clone().with_heading_path(heading_path.to_vec());

        let mut chunk = Chunk::new(meta.document_id, index, packed.content, token_count, source);
        chunk.overlap_len = packed.overlap_len;
        chunk.codes = extract_codes(&chunk.content);
        chunk.keywords = self.tables.keywords_in(&chunk.content, self.config.max_keywords);
        chunk.topic = meta
            .topic
            .clone()
            .or_else(|| self.tables.infer_topic(&chunk.content));
        chunk
    }
}

fn joined_with(buffer: &[String], next: &str) -> String {
    let mut joined = buffer.join(" ");
    if !joined.is_empty() {
        joined.push(' ');
    }
    joined.push_str(next);
    joined
}

fn emit(buffer: &[String], carried: usize) -> PackedChunk {
    let overlap_len = if carried > 0 {
        buffer[..carried].join(" ").len()
    } else {
        0
    };
    PackedChunk {
        content: buffer.join(" "),
        overlap_len,
    }
}

/// Split text into trimmed sentences.
///
/// Dots between two digits are masked first so that clause numbers such as
/// "232.3.9" and decimals never end a sentence. Newlines always end one.
pub fn split_sentences(text: &str) -> Vec<String> {
    let masked = mask_code_dots(text);
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = masked.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\n' || c == '\r' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }

        current.push(c);

        if TERMINATORS.contains(&c) {
            let at_boundary = chars.peek().map_or(true, |next| next.is_whitespace());
            if at_boundary && !is_enumerator(&current) {
                push_sentence(&mut sentences, &mut current);
            }
        }
    }
    push_sentence(&mut sentences, &mut current);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.replace(DOT_MASK, "."));
    }
    current.clear();
}

/// List markers such as "1." or "(2)." do not end a sentence
fn is_enumerator(current: &str) -> bool {
    let body = current.trim().trim_end_matches(&TERMINATORS[..]);
    let body = body.trim_matches(|c| c == '(' || c == ')');
    !body.is_empty() && body.len() <= 3 && body.chars().all(|c| c.is_ascii_digit())
}

fn mask_code_dots(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut masked = String::with_capacity(text.len());

    for (i, &c) in chars.iter().enumerate() {
        let between_digits = c == '.'
            && i > 0
            && chars[i - 1].is_ascii_digit()
            && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit());
        masked.push(if between_digits { DOT_MASK } else { c });
    }

    masked
}
