use std::collections::HashMap;

use crate::index::Candidate;
use crate::models::SimilarityHit;

/// Reciprocal Rank Fusion over any number of ranked candidate lists.
///
/// RRF formula: score(d) = Σ 1 / (rank_i(d) + k), with zero-based ranks.
/// Ties keep first-insertion order: lists are walked in the order given,
/// each list best first.
#[derive(Debug, Clone, Copy)]
pub struct RrfFusion {
    k: f32,
}

impl RrfFusion {
    pub fn new(k: f32) -> Self {
        Self { k }
    }

    /// Fuse `lists` and return hits sorted by fused score descending.
    ///
    /// A candidate appearing in several lists accumulates one term per list
    /// and keeps the payload from its first appearance.
    pub fn fuse(&self, lists: &[&[Candidate]]) -> Vec<SimilarityHit> {
        let mut position: HashMap<&str, usize> = HashMap::new();
        let mut fused: Vec<SimilarityHit> = Vec::new();

        for list in lists {
            for (rank, candidate) in list.iter().enumerate() {
                let term = 1.0 / (rank as f32 + self.k);
                match position.get(candidate.id.as_str()) {
                    Some(&i) => {
                        let hit = &mut fused[i];
                        hit.score += term;
                        if hit.payload.is_none() {
                            hit.payload = candidate.payload.clone();
                        }
                    }
                    None => {
                        position.insert(candidate.id.as_str(), fused.len());
                        fused.push(SimilarityHit {
                            id: candidate.id.clone(),
                            score: term,
                            payload: candidate.payload.clone(),
                        });
                    }
                }
            }
        }

        // sort_by is stable: equal scores keep insertion order
        fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        fused
    }
}

impl Default for RrfFusion {
    fn default() -> Self {
        Self::new(2.0)
    }
}
