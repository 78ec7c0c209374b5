use async_trait::async_trait;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::IndexConfig;
use crate::error::{AppError, Result};
use crate::index::{Candidate, HybridCandidates, HybridQuery, IndexPoint, PayloadFilter, VectorIndex};
use crate::models::Payload;

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const SPARSE_VECTOR_NAME: &str = "sparse";

/// Payload fields that get an integer index for filtered lookups.
const INDEXED_FIELDS: [&str; 2] = ["issue_number", "comment_id"];

/// Qdrant collection accessed over its REST API.
pub struct QdrantIndex {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    dense_size: usize,
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    points: Vec<ScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct ScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Payload>,
}

#[derive(Debug, Deserialize)]
struct ScrollResult {
    points: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ExistsResult {
    exists: bool,
}

impl QdrantIndex {
    pub fn new(config: &IndexConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            collection: config.collection_name(),
            dense_size: config.dense_size,
        }
    }

    async fn call<T: DeserializeOwned>(&self, method: Method, path: &str, body: Option<Value>) -> Result<T> {
        let url = format!("{}/collections/{}{path}", self.base_url, self.collection);
        let mut request = self.client.request(method, &url);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Index(format!("{url} returned {status}: {body}")));
        }

        let envelope = response.json::<Envelope<T>>().await?;
        Ok(envelope.result)
    }

    async fn collection_exists(&self) -> Result<bool> {
        let result: ExistsResult = self.call(Method::GET, "/exists", None).await?;
        Ok(result.exists)
    }
}

fn point_id(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn into_candidates(result: QueryResult) -> Vec<Candidate> {
    result
        .points
        .into_iter()
        .map(|p| Candidate {
            id: point_id(&p.id),
            score: p.score,
            payload: p.payload,
        })
        .collect()
}

fn batch_query_body(query: &HybridQuery<'_>) -> Value {
    json!({
        "searches": [
            {
                "query": {
                    "indices": query.sparse.indices,
                    "values": query.sparse.values,
                },
                "using": SPARSE_VECTOR_NAME,
                "limit": query.sparse_limit,
                "with_payload": true,
            },
            {
                "query": query.dense,
                "using": DENSE_VECTOR_NAME,
                "limit": query.dense_limit,
                "score_threshold": query.dense_threshold,
                "with_payload": true,
            }
        ]
    })
}

fn filter_body(filter: &PayloadFilter) -> Value {
    let must: Vec<Value> = filter
        .must
        .iter()
        .map(|(key, value)| json!({"key": key, "match": {"value": value}}))
        .collect();
    json!({"must": must})
}

fn upsert_body(points: Vec<IndexPoint>) -> Value {
    let points: Vec<Value> = points
        .into_iter()
        .map(|p| {
            json!({
                "id": p.id,
                "vector": {
                    DENSE_VECTOR_NAME: p.dense,
                    SPARSE_VECTOR_NAME: {
                        "indices": p.sparse.indices,
                        "values": p.sparse.values,
                    },
                },
                "payload": p.payload,
            })
        })
        .collect();
    json!({"points": points})
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn query(&self, query: &HybridQuery<'_>) -> Result<HybridCandidates> {
        let results: Vec<QueryResult> = self
            .call(Method::POST, "/points/query/batch", Some(batch_query_body(query)))
            .await?;

        let mut results = results.into_iter();
        match (results.next(), results.next()) {
            (Some(sparse), Some(dense)) => Ok(HybridCandidates {
                sparse: into_candidates(sparse),
                dense: into_candidates(dense),
            }),
            _ => Err(AppError::Index(
                "batch query returned fewer than two result sets".to_string(),
            )),
        }
    }

    async fn upsert(&self, points: Vec<IndexPoint>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let _: Value = self
            .call(Method::PUT, "/points?wait=true", Some(upsert_body(points)))
            .await?;
        Ok(())
    }

    async fn exists(&self, filter: &PayloadFilter) -> Result<bool> {
        let result: ScrollResult = self
            .call(
                Method::POST,
                "/points/scroll",
                Some(json!({
                    "filter": filter_body(filter),
                    "limit": 1,
                    "with_payload": false,
                    "with_vector": false,
                })),
            )
            .await?;
        Ok(!result.points.is_empty())
    }

    async fn ensure_collection(&self) -> Result<()> {
        if self.collection_exists().await? {
            tracing::info!(collection = %self.collection, "Collection already exists");
        } else {
            let _: Value = self
                .call(
                    Method::PUT,
                    "",
                    Some(json!({
                        "vectors": {
                            DENSE_VECTOR_NAME: {"size": self.dense_size, "distance": "Cosine"},
                        },
                        "sparse_vectors": {
                            SPARSE_VECTOR_NAME: {"modifier": "idf"},
                        },
                        "quantization_config": {
                            "scalar": {"type": "int8", "quantile": 0.99, "always_ram": true},
                        },
                    })),
                )
                .await?;
            tracing::info!(collection = %self.collection, "Collection created");
        }

        for field in INDEXED_FIELDS {
            let created: Result<Value> = self
                .call(
                    Method::PUT,
                    "/index?wait=true",
                    Some(json!({"field_name": field, "field_schema": "integer"})),
                )
                .await;
            if let Err(e) = created {
                tracing::info!(field, error = %e, "Payload index may already exist");
            }
        }

        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        if !self.collection_exists().await? {
            tracing::info!(collection = %self.collection, "Collection does not exist");
            return Ok(());
        }
        let _: Value = self.call(Method::DELETE, "", None).await?;
        tracing::info!(collection = %self.collection, "Collection deleted");
        Ok(())
    }
}
