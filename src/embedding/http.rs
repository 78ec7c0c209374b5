use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::EmbeddingConfig;
use crate::embedding::{Embedder, SparseVector};
use crate::error::{AppError, Result};

/// Client for text-embeddings-inference style servers: one deployment for
/// the dense model (`/embed`) and one for the sparse model (`/embed_sparse`).
pub struct HttpEmbedder {
    client: Client,
    dense_url: String,
    sparse_url: String,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    truncate: bool,
}

#[derive(Debug, Deserialize)]
struct SparseTerm {
    index: u32,
    value: f32,
}

impl HttpEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            client: Client::new(),
            dense_url: config.dense_url.trim_end_matches('/').to_string(),
            sparse_url: config.sparse_url.trim_end_matches('/').to_string(),
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(&self, url: String, texts: &[String]) -> Result<T> {
        let response = self
            .client
            .post(&url)
            .json(&EmbedRequest {
                inputs: texts,
                truncate: true,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Embedding(format!("{url} returned {status}: {body}")));
        }

        Ok(response.json::<T>().await?)
    }
}

fn ensure_count<T>(kind: &str, expected: usize, got: Vec<T>) -> Result<Vec<T>> {
    if got.len() != expected {
        return Err(AppError::Embedding(format!(
            "{kind} embedding returned {} vectors for {expected} inputs",
            got.len()
        )));
    }
    Ok(got)
}

fn into_sparse(terms: Vec<SparseTerm>) -> SparseVector {
    let (indices, values) = terms.into_iter().map(|t| (t.index, t.value)).unzip();
    SparseVector { indices, values }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let vectors: Vec<Vec<f32>> = self.post(format!("{}/embed", self.dense_url), texts).await?;
        ensure_count("dense", texts.len(), vectors)
    }

    async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let raw: Vec<Vec<SparseTerm>> = self
            .post(format!("{}/embed_sparse", self.sparse_url), texts)
            .await?;
        let vectors = raw.into_iter().map(into_sparse).collect();
        ensure_count("sparse", texts.len(), vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sparse_response_shape() {
        let raw: Vec<Vec<SparseTerm>> =
            serde_json::from_str(r#"[[{"index": 3, "value": 0.5}, {"index": 17, "value": 1.25}]]"#)
                .unwrap();
        let vector = into_sparse(raw.into_iter().next().unwrap());
        assert_eq!(vector.indices, vec![3, 17]);
        assert_eq!(vector.values, vec![0.5, 1.25]);
    }

    #[test]
    fn test_count_mismatch_is_error() {
        let err = ensure_count("dense", 2, vec![vec![0.1f32]]).unwrap_err();
        assert!(err.to_string().contains("1 vectors for 2 inputs"));
    }
}
