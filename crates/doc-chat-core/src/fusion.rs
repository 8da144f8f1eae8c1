//! Distribution-based score fusion (DBSF).
//!
//! Merges ranked candidate lists whose raw scores live on unrelated scales
//! (cosine similarity vs TF-IDF dot products) into one ranked list. Naive
//! score addition would let the wider-ranged signal dominate; instead each
//! list is normalized by its own score distribution before summing:
//!
//! 1. Per list, map scores onto `[0, 1]` using `mean ± 3σ` as the bounds
//!    (clamped). A degenerate list (all scores equal) normalizes to 0.5.
//! 2. Sum the normalized scores of each passage across lists, so a passage
//!    found by both signals outranks one found by a single signal.
//! 3. Sort descending (id ascending on ties), drop results under
//!    `score_threshold`, truncate to `limit`.

use std::collections::HashMap;

use crate::models::ScoredPassage;

/// Fuse candidate lists into at most `limit` results, each scoring at least
/// `score_threshold`.
pub fn fuse(
    candidate_lists: Vec<Vec<ScoredPassage>>,
    limit: usize,
    score_threshold: f32,
) -> Vec<ScoredPassage> {
    let mut fused: HashMap<String, ScoredPassage> = HashMap::new();

    for list in &candidate_lists {
        let normalized = normalize(list);
        for (candidate, score) in list.iter().zip(normalized) {
            fused
                .entry(candidate.id.clone())
                .and_modify(|p| p.score += score)
                .or_insert_with(|| ScoredPassage {
                    id: candidate.id.clone(),
                    score,
                    payload: candidate.payload.clone(),
                });
        }
    }

    let mut results: Vec<ScoredPassage> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
    results.retain(|p| p.score >= score_threshold);
    results.truncate(limit);
    results
}

/// Normalize one list's scores onto `[0, 1]` around its own distribution.
fn normalize(list: &[ScoredPassage]) -> Vec<f32> {
    if list.is_empty() {
        return Vec::new();
    }

    let n = list.len() as f32;
    let mean: f32 = list.iter().map(|p| p.score).sum::<f32>() / n;
    let variance: f32 = list.iter().map(|p| (p.score - mean).powi(2)).sum::<f32>() / n;
    let std_dev = variance.sqrt();

    let low = mean - 3.0 * std_dev;
    let high = mean + 3.0 * std_dev;
    let range = high - low;

    if range < f32::EPSILON {
        return vec![0.5; list.len()];
    }

    list.iter()
        .map(|p| ((p.score - low) / range).clamp(0.0, 1.0))
        .collect()
}
