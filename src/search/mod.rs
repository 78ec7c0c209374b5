pub mod engine;
pub mod fusion;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::SimilarityHit;

pub use engine::SimilaritySearchEngine;
pub use fusion::RrfFusion;

/// Retrieval of historical issues similar to a query text.
#[async_trait]
pub trait SimilaritySearch: Send + Sync {
    async fn search_similar(&self, query_text: &str, limit: usize) -> Result<Vec<SimilarityHit>>;
}
