//! Character-set similarity for near-miss term suggestions

use std::collections::HashSet;
use unicode_segmentation::UnicodeSegmentation;

/// Jaccard similarity of the two strings' character sets (case-insensitive)
pub fn jaccard(a: &str, b: &str) -> f32 {
    let a: HashSet<char> = a.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();
    let b: HashSet<char> = b.to_lowercase().chars().filter(|c| !c.is_whitespace()).collect();

    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f32 / union as f32
}

/// Most similar word in `texts` with similarity at least `threshold`.
///
/// Exact (case-insensitive) matches are skipped since they would have been
/// verified verbatim.
pub fn find_near_miss<'a, I>(term: &str, texts: I, threshold: f32) -> Option<(String, f32)>
where
    I: IntoIterator<Item = &'a str>,
{
    let term_lower = term.to_lowercase();
    let mut best: Option<(String, f32)> = None;

    for text in texts {
        for word in text.unicode_words() {
            if word.chars().count() < 2 || word.to_lowercase() == term_lower {
                continue;
            }
            let score = jaccard(term, word);
            if score >= threshold && best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((word.to_string(), score));
            }
        }
    }

    best
}
