pub mod memory;
pub mod qdrant;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{IndexBackend, IndexConfig};
use crate::embedding::SparseVector;
use crate::error::Result;
use crate::models::Payload;

pub use memory::MemoryIndex;
pub use qdrant::QdrantIndex;

/// One ranked candidate from a single retrieval.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub id: String,
    pub score: f32,
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone)]
pub struct HybridQuery<'a> {
    pub dense: &'a [f32],
    pub sparse: &'a SparseVector,
    /// Minimum cosine similarity for dense candidates.
    pub dense_threshold: f32,
    pub sparse_limit: usize,
    pub dense_limit: usize,
}

/// The two independently ranked candidate lists, best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HybridCandidates {
    pub sparse: Vec<Candidate>,
    pub dense: Vec<Candidate>,
}

#[derive(Debug, Clone)]
pub struct IndexPoint {
    pub id: String,
    pub dense: Vec<f32>,
    pub sparse: SparseVector,
    pub payload: Payload,
}

/// Conjunction of payload equality conditions.
#[derive(Debug, Clone, Default)]
pub struct PayloadFilter {
    pub must: Vec<(String, serde_json::Value)>,
}

impl PayloadFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn must_eq(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.must.push((key.to_string(), value.into()));
        self
    }

    pub fn matches(&self, payload: &Payload) -> bool {
        self.must
            .iter()
            .all(|(key, value)| payload.get(key) == Some(value))
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Run the sparse and dense retrievals for one query.
    async fn query(&self, query: &HybridQuery<'_>) -> Result<HybridCandidates>;

    /// Insert or replace points by id.
    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()>;

    /// Whether any point's payload satisfies `filter`.
    async fn exists(&self, filter: &PayloadFilter) -> Result<bool>;

    /// Create the collection and payload indexes if missing.
    async fn ensure_collection(&self) -> Result<()>;

    /// Drop the collection and every point in it. Missing is not an error.
    async fn delete_collection(&self) -> Result<()>;
}

/// Index backend selected by configuration.
pub fn from_config(config: &IndexConfig) -> Arc<dyn VectorIndex> {
    match config.backend {
        IndexBackend::Qdrant => Arc::new(QdrantIndex::new(config)),
        IndexBackend::Memory => Arc::new(MemoryIndex::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_filter_requires_every_condition() {
        let payload = json!({"issue_number": 3, "comment_id": 11})
            .as_object()
            .cloned()
            .unwrap();

        assert!(PayloadFilter::new().matches(&payload));
        assert!(PayloadFilter::new()
            .must_eq("issue_number", 3)
            .must_eq("comment_id", 11)
            .matches(&payload));
        assert!(!PayloadFilter::new()
            .must_eq("issue_number", 3)
            .must_eq("comment_id", 12)
            .matches(&payload));
    }
}
