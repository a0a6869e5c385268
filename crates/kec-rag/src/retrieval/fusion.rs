//! Reciprocal Rank Fusion over several ranked result lists

use std::collections::HashMap;
use uuid::Uuid;

use crate::types::RetrievalResult;

/// Fuse ranked lists with `score = Σ 1 / (k + rank)`, ranks starting at 1.
///
/// A chunk keeps the first result seen for it; only its score changes.
/// Output is sorted by fused score, ties in first-seen order.
pub fn reciprocal_rank_fusion(lists: Vec<Vec<RetrievalResult>>, k: f32) -> Vec<RetrievalResult> {
    let mut positions: HashMap<Uuid, usize> = HashMap::new();
    let mut fused: Vec<(RetrievalResult, f32)> = Vec::new();

    for list in lists {
        for (i, result) in list.into_iter().enumerate() {
            let contribution = 1.0 / (k + (i + 1) as f32);
            match positions.get(&result.chunk.id) {
                Some(&pos) => fused[pos].1 += contribution,
                None => {
                    positions.insert(result.chunk.id, fused.len());
                    fused.push((result, contribution));
                }
            }
        }
    }

    fused.sort_by(|a, b| b.1.total_cmp(&a.1));
    fused
        .into_iter()
        .map(|(mut result, score)| {
            result.score = score.clamp(0.0, 1.0);
            result
        })
        .collect()
}
