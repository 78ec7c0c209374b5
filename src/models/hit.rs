use serde::{Deserialize, Serialize};

/// Opaque per-point metadata stored alongside the vectors.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// A fused search result. Consumed immediately into `IssueState.similar_issues`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityHit {
    pub id: String,
    pub score: f32,
    pub payload: Option<Payload>,
}

impl SimilarityHit {
    pub fn str_field(&self, key: &str) -> Option<String> {
        self.payload
            .as_ref()?
            .get(key)?
            .as_str()
            .map(str::to_string)
    }

    pub fn u64_field(&self, key: &str) -> Option<u64> {
        self.payload.as_ref()?.get(key)?.as_u64()
    }

    pub fn bool_field(&self, key: &str) -> Option<bool> {
        self.payload.as_ref()?.get(key)?.as_bool()
    }
}
