//! Token count estimation

use crate::config::ChunkingConfig;

/// Length-based token estimator.
///
/// CJK-heavy text is estimated at `cjk_token_ratio` tokens per character,
/// anything else at one token per `chars_per_token` characters.
#[derive(Debug, Clone, Copy)]
pub struct TokenEstimator {
    cjk_token_ratio: f32,
    chars_per_token: usize,
    cjk_threshold: f32,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::from_config(&ChunkingConfig::default())
    }
}

impl TokenEstimator {
    pub fn from_config(config: &ChunkingConfig) -> Self {
        Self {
            cjk_token_ratio: config.cjk_token_ratio,
            chars_per_token: config.chars_per_token.max(1),
            cjk_threshold: config.cjk_threshold,
        }
    }

    /// Estimated tokens for `text`
    pub fn estimate(&self, text: &str) -> usize {
        let mut total = 0usize;
        let mut visible = 0usize;
        let mut cjk = 0usize;

        for c in text.chars() {
            total += 1;
            if !c.is_whitespace() {
                visible += 1;
                if is_cjk(c) {
                    cjk += 1;
                }
            }
        }

        if total == 0 {
            return 0;
        }

        if visible > 0 && cjk as f32 / visible as f32 >= self.cjk_threshold {
            let estimate = (total as f64 * f64::from(self.cjk_token_ratio) - 1e-6).ceil();
            (estimate as usize).max(1)
        } else {
            total.div_ceil(self.chars_per_token)
        }
    }
}

/// Hangul, CJK ideographs and kana
pub fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{AC00}'..='\u{D7A3}'   // Hangul syllables
        | '\u{1100}'..='\u{11FF}' // Hangul jamo
        | '\u{3130}'..='\u{318F}' // Hangul compatibility jamo
        | '\u{4E00}'..='\u{9FFF}' // CJK unified ideographs
        | '\u{3040}'..='\u{30FF}' // Hiragana and Katakana
    )
}
