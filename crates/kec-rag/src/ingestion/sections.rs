//! Section extraction from markdown headings and numbered clause headings

use once_cell::sync::Lazy;
use regex::Regex;

static MARKDOWN_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(#{1,6})\s+(.+?)\s*#*\s*$").expect("valid regex"));

/// "142.6 공통접지 및 통합접지" style clause titles
static CLAUSE_HEADING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{3}(?:\.\d{1,2}){0,4})\s+(\S.*)$").expect("valid regex"));

/// Clause headings always nest below markdown headings
const CLAUSE_LEVEL_BASE: usize = 10;

/// Longest line still treated as a clause title
const MAX_CLAUSE_TITLE_CHARS: usize = 60;

/// A titled run of text
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Section {
    /// Outermost to innermost heading
    pub heading_path: Vec<String>,
    /// Heading line followed by its body
    pub content: String,
}

/// Split text into sections at headings.
///
/// Text before the first heading becomes a section with an empty heading
/// path. The heading title is kept as the first line of its section so
/// that codes in clause titles stay searchable.
pub fn parse_sections(text: &str) -> Vec<Section> {
    let mut sections = Vec::new();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut current = Section::default();

    for line in text.lines() {
        match heading(line) {
            Some((level, title)) => {
                flush(&mut sections, &mut current);

                while stack.last().is_some_and(|(l, _)| *l >= level) {
                    stack.pop();
                }
                stack.push((level, title.clone()));

                current.heading_path = stack.iter().map(|(_, t)| t.clone()).collect();
                current.content.push_str(&title);
            }
            None => {
                if !current.content.is_empty() {
                    current.content.push('\n');
                }
                current.content.push_str(line);
            }
        }
    }
    flush(&mut sections, &mut current);

    sections
}

/// True when any section carries a heading
pub fn has_headings(sections: &[Section]) -> bool {
    sections.iter().any(|s| !s.heading_path.is_empty())
}

fn flush(sections: &mut Vec<Section>, current: &mut Section) {
    let section = std::mem::take(current);
    if !section.content.trim().is_empty() {
        sections.push(section);
    }
}

fn heading(line: &str) -> Option<(usize, String)> {
    let line = line.trim();

    if let Some(caps) = MARKDOWN_HEADING.captures(line) {
        return Some((caps[1].len(), caps[2].to_string()));
    }

    let caps = CLAUSE_HEADING.captures(line)?;
    let title = caps[2].trim_end();
    let is_sentence = title.ends_with('.') || title.ends_with("다") || title.ends_with(',');
    if is_sentence || line.chars().count() > MAX_CLAUSE_TITLE_CHARS {
        return None;
    }

    let depth = caps[1].matches('.').count();
    Some((CLAUSE_LEVEL_BASE + depth, line.to_string()))
}
