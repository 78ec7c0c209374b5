use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::embedding::cosine;
use crate::error::Result;
use crate::index::{Candidate, HybridCandidates, HybridQuery, IndexPoint, PayloadFilter, VectorIndex};

/// Process-local index for development and tests. Points keep insertion
/// order; equal scores rank in that order.
#[derive(Default)]
pub struct MemoryIndex {
    points: RwLock<Vec<IndexPoint>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.points.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.points.read().await.is_empty()
    }
}

fn top(mut scored: Vec<Candidate>, limit: usize) -> Vec<Candidate> {
    // sort_by is stable, so ties keep insertion order
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    async fn query(&self, query: &HybridQuery<'_>) -> Result<HybridCandidates> {
        let points = self.points.read().await;

        let sparse = points
            .iter()
            .map(|p| (p, p.sparse.dot(query.sparse)))
            .filter(|(_, score)| *score > 0.0)
            .map(|(p, score)| Candidate {
                id: p.id.clone(),
                score,
                payload: Some(p.payload.clone()),
            })
            .collect();

        let dense = points
            .iter()
            .map(|p| (p, cosine(&p.dense, query.dense)))
            .filter(|(_, score)| *score >= query.dense_threshold)
            .map(|(p, score)| Candidate {
                id: p.id.clone(),
                score,
                payload: Some(p.payload.clone()),
            })
            .collect();

        Ok(HybridCandidates {
            sparse: top(sparse, query.sparse_limit),
            dense: top(dense, query.dense_limit),
        })
    }

    async fn upsert(&self, new_points: Vec<IndexPoint>) -> Result<()> {
        let mut points = self.points.write().await;
        for point in new_points {
            match points.iter_mut().find(|p| p.id == point.id) {
                Some(existing) => *existing = point,
                None => points.push(point),
            }
        }
        Ok(())
    }

    async fn exists(&self, filter: &PayloadFilter) -> Result<bool> {
        let points = self.points.read().await;
        Ok(points.iter().any(|p| filter.matches(&p.payload)))
    }

    async fn ensure_collection(&self) -> Result<()> {
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.points.write().await.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::SparseVector;
    use serde_json::json;

    fn point(id: &str, dense: Vec<f32>, terms: &[(u32, f32)], issue: u64) -> IndexPoint {
        IndexPoint {
            id: id.to_string(),
            dense,
            sparse: SparseVector {
                indices: terms.iter().map(|t| t.0).collect(),
                values: terms.iter().map(|t| t.1).collect(),
            },
            payload: json!({"issue_number": issue}).as_object().cloned().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_query_applies_threshold_and_limits() {
        let index = MemoryIndex::new();
        index
            .upsert(vec![
                point("a", vec![1.0, 0.0], &[(1, 1.0)], 1),
                point("b", vec![0.95, 0.1], &[(1, 2.0), (2, 1.0)], 2),
                point("c", vec![0.0, 1.0], &[(3, 1.0)], 3),
            ])
            .await
            .unwrap();

        let sparse = SparseVector { indices: vec![1], values: vec![1.0] };
        let candidates = index
            .query(&HybridQuery {
                dense: &[1.0, 0.0],
                sparse: &sparse,
                dense_threshold: 0.9,
                sparse_limit: 1,
                dense_limit: 10,
            })
            .await
            .unwrap();

        let sparse_ids: Vec<_> = candidates.sparse.iter().map(|c| c.id.as_str()).collect();
        let dense_ids: Vec<_> = candidates.dense.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(sparse_ids, vec!["b"]);
        assert_eq!(dense_ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_id_and_exists() {
        let index = MemoryIndex::new();
        index.upsert(vec![point("a", vec![1.0], &[], 1)]).await.unwrap();
        index.upsert(vec![point("a", vec![1.0], &[], 2)]).await.unwrap();

        assert_eq!(index.len().await, 1);
        assert!(index.exists(&PayloadFilter::new().must_eq("issue_number", 2)).await.unwrap());
        assert!(!index.exists(&PayloadFilter::new().must_eq("issue_number", 1)).await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_collection_drops_points() {
        let index = MemoryIndex::new();
        index
            .upsert(vec![point("a", vec![1.0], &[(1, 1.0)], 1), point("b", vec![1.0], &[], 2)])
            .await
            .unwrap();

        index.delete_collection().await.unwrap();

        assert!(index.is_empty().await);
        assert!(!index.exists(&PayloadFilter::new().must_eq("issue_number", 1)).await.unwrap());

        // Dropping an empty collection is fine, and it can be filled again.
        index.delete_collection().await.unwrap();
        index.ensure_collection().await.unwrap();
        index.upsert(vec![point("c", vec![1.0], &[], 3)]).await.unwrap();
        assert_eq!(index.len().await, 1);
    }
}
