use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SearchConfig;
use crate::embedding::Embedder;
use crate::error::{AppError, Result};
use crate::index::{HybridQuery, VectorIndex};
use crate::models::SimilarityHit;
use crate::search::{RrfFusion, SimilaritySearch};

/// Hybrid dense + sparse retrieval fused with RRF. Read-only over the index.
pub struct SimilaritySearchEngine {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    fusion: RrfFusion,
    candidate_limit: usize,
    dense_threshold: f32,
}

impl SimilaritySearchEngine {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: &SearchConfig) -> Self {
        Self {
            embedder,
            index,
            fusion: RrfFusion::new(config.rrf_k),
            candidate_limit: config.candidate_limit,
            dense_threshold: config.dense_threshold,
        }
    }
}

#[async_trait]
impl SimilaritySearch for SimilaritySearchEngine {
    async fn search_similar(&self, query_text: &str, limit: usize) -> Result<Vec<SimilarityHit>> {
        let texts = [query_text.to_string()];

        let dense = self
            .embedder
            .embed_dense(&texts)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("no dense vector for query".to_string()))?;
        let sparse = self
            .embedder
            .embed_sparse(&texts)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::Embedding("no sparse vector for query".to_string()))?;

        let candidates = self
            .index
            .query(&HybridQuery {
                dense: &dense,
                sparse: &sparse,
                dense_threshold: self.dense_threshold,
                sparse_limit: self.candidate_limit,
                dense_limit: self.candidate_limit,
            })
            .await?;

        let mut hits = self.fusion.fuse(&[&candidates.sparse, &candidates.dense]);
        hits.truncate(limit);

        tracing::debug!(
            sparse_candidates = candidates.sparse.len(),
            dense_candidates = candidates.dense.len(),
            hits = hits.len(),
            "Hybrid search fused"
        );

        Ok(hits)
    }
}
