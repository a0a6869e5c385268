//! Hallucination and confidence scoring

use crate::config::CategoryWeights;

/// Verified/unverified counts for one claim category
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CategoryCounts {
    pub verified: usize,
    pub unverified: usize,
}

impl CategoryCounts {
    pub fn new(verified: usize, unverified: usize) -> Self {
        Self { verified, unverified }
    }

    fn is_empty(&self) -> bool {
        self.verified + self.unverified == 0
    }
}

/// Counts for the three claim categories
#[derive(Debug, Clone, Copy, Default)]
pub struct ClaimCounts {
    pub terms: CategoryCounts,
    pub codes: CategoryCounts,
    pub formulas: CategoryCounts,
}

/// Hallucination and confidence, both in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scores {
    pub hallucination: f32,
    pub confidence: f32,
}

/// Term unverified ratio: unverified against verified terms, capped at 1.
/// Two verified and one unverified term give 1/2.
pub fn term_unverified_ratio(counts: CategoryCounts) -> Option<f32> {
    if counts.is_empty() {
        return None;
    }
    Some((counts.unverified as f32 / counts.verified.max(1) as f32).min(1.0))
}

/// Share of claims in the category that could not be verified
pub fn unverified_ratio(counts: CategoryCounts) -> Option<f32> {
    if counts.is_empty() {
        return None;
    }
    Some(counts.unverified as f32 / (counts.verified + counts.unverified) as f32)
}

/// Weighted scores over the categories that have claims.
///
/// A category without claims contributes neither to the numerator nor to
/// the weight sum. With no claims at all, hallucination is 0 and confidence 1.
pub fn score(counts: &ClaimCounts, weights: &CategoryWeights) -> Scores {
    let ratios = [
        (term_unverified_ratio(counts.terms), weights.terms),
        (unverified_ratio(counts.codes), weights.codes),
        (unverified_ratio(counts.formulas), weights.formulas),
    ];

    let mut weight_sum = 0.0f32;
    let mut unverified_sum = 0.0f32;
    let mut verified_sum = 0.0f32;

    for (ratio, weight) in ratios {
        if let Some(ratio) = ratio {
            let weight = weight.max(0.0);
            weight_sum += weight;
            unverified_sum += weight * ratio;
            verified_sum += weight * (1.0 - ratio);
        }
    }

    if weight_sum <= 0.0 {
        return Scores {
            hallucination: 0.0,
            confidence: 1.0,
        };
    }

    let hallucination = (unverified_sum / weight_sum).clamp(0.0, 1.0);
    let confidence = ((verified_sum / weight_sum) * (1.0 - hallucination)).clamp(0.0, 1.0);

    Scores {
        hallucination,
        confidence,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn weights() -> CategoryWeights {
        CategoryWeights::default()
    }

    #[test]
    fn test_term_ratio_scenario() {
        assert_eq!(term_unverified_ratio(CategoryCounts::new(2, 1)), Some(0.5));
        assert_eq!(term_unverified_ratio(CategoryCounts::new(0, 3)), Some(1.0));
        assert_eq!(term_unverified_ratio(CategoryCounts::default()), None);
    }

    #[test]
    fn test_missing_categories_are_excluded() {
        let counts = ClaimCounts {
            terms: CategoryCounts::new(2, 1),
            ..Default::default()
        };
        let scores = score(&counts, &weights());
        assert!((scores.hallucination - 0.5).abs() < 1e-6);
        assert!((scores.confidence - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_weighted_average() {
        let counts = ClaimCounts {
            terms: CategoryCounts::new(4, 0),
            codes: CategoryCounts::new(1, 1),
            formulas: CategoryCounts::default(),
        };
        // (0.3 * 0 + 0.4 * 0.5) / 0.7
        let scores = score(&counts, &weights());
        assert!((scores.hallucination - 0.2 / 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_no_claims() {
        let scores = score(&ClaimCounts::default(), &weights());
        assert_eq!(scores, Scores { hallucination: 0.0, confidence: 1.0 });
    }

    #[test]
    fn test_zero_weights() {
        let counts = ClaimCounts {
            codes: CategoryCounts::new(0, 2),
            ..Default::default()
        };
        let zero = CategoryWeights { terms: 0.0, codes: 0.0, formulas: 0.0 };
        assert_eq!(score(&counts, &zero).hallucination, 0.0);
    }

    proptest! {
        #[test]
        fn prop_scores_in_unit_interval(
            tv in 0usize..20, tu in 0usize..20,
            cv in 0usize..20, cu in 0usize..20,
            fv in 0usize..20, fu in 0usize..20,
            wt in 0.0f32..2.0, wc in 0.0f32..2.0, wf in 0.0f32..2.0,
        ) {
            let counts = ClaimCounts {
                terms: CategoryCounts::new(tv, tu),
                codes: CategoryCounts::new(cv, cu),
                formulas: CategoryCounts::new(fv, fu),
            };
            let scores = score(&counts, &CategoryWeights { terms: wt, codes: wc, formulas: wf });
            prop_assert!((0.0..=1.0).contains(&scores.hallucination));
            prop_assert!((0.0..=1.0).contains(&scores.confidence));
            prop_assert!(scores.hallucination.is_finite() && scores.confidence.is_finite());
        }
    }
}
