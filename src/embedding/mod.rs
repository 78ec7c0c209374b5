pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use http::HttpEmbedder;

/// Term-weighted vector: parallel `indices` and `values`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    /// Dot product over shared term indices.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        self.indices
            .iter()
            .zip(&self.values)
            .map(|(index, value)| {
                other
                    .indices
                    .iter()
                    .position(|i| i == index)
                    .map_or(0.0, |pos| value * other.values[pos])
            })
            .sum()
    }
}

/// Produces dense and sparse vectors for text. Must be deterministic for
/// identical input under a fixed model version.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>>;
}

pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
