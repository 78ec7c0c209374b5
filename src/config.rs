use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub claude: ClaudeConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    pub github: Option<GitHubConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Upper bound on issues triaged at the same time.
    #[serde(default = "default_max_concurrent_triage")]
    pub max_concurrent_triage: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_concurrent_triage: default_max_concurrent_triage(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct ClaudeConfig {
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_true")]
    pub rate_limit_retry: bool,
    #[serde(default = "default_rate_limit_max_retries")]
    pub rate_limit_max_retries: u32,
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for ClaudeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClaudeConfig")
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("rate_limit_retry", &self.rate_limit_retry)
            .field("rate_limit_max_retries", &self.rate_limit_max_retries)
            .field("rate_limit_backoff_secs", &self.rate_limit_backoff_secs)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    /// Base URL of the dense embedding server (`POST /embed`).
    #[serde(default = "default_dense_url")]
    pub dense_url: String,
    /// Base URL of the sparse embedding server (`POST /embed_sparse`).
    #[serde(default = "default_sparse_url")]
    pub sparse_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dense_url: default_dense_url(),
            sparse_url: default_sparse_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    Qdrant,
    Memory,
}

#[derive(Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_backend")]
    pub backend: IndexBackend,
    #[serde(default = "default_qdrant_url")]
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    /// Dimension of the dense vectors, used when creating the collection.
    #[serde(default = "default_dense_size")]
    pub dense_size: usize,
}

impl IndexConfig {
    /// Collections are namespaced per environment.
    pub fn collection_name(&self) -> String {
        format!("{}_{}", self.app_env, self.collection)
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            backend: default_index_backend(),
            url: default_qdrant_url(),
            api_key: None,
            app_env: default_app_env(),
            collection: default_collection(),
            dense_size: default_dense_size(),
        }
    }
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for IndexConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexConfig")
            .field("backend", &self.backend)
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("app_env", &self.app_env)
            .field("collection", &self.collection)
            .field("dense_size", &self.dense_size)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    /// Number of fused hits returned to the pipeline.
    #[serde(default = "default_search_limit")]
    pub limit: usize,
    /// Candidates fetched from each of the sparse and dense retrievals.
    #[serde(default = "default_candidate_limit")]
    pub candidate_limit: usize,
    /// Minimum cosine similarity for dense candidates.
    #[serde(default = "default_dense_threshold")]
    pub dense_threshold: f32,
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f32,
    /// Distinct reference URLs handed to the recommendation stage.
    #[serde(default = "default_max_references")]
    pub max_references: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            limit: default_search_limit(),
            candidate_limit: default_candidate_limit(),
            dense_threshold: default_dense_threshold(),
            rrf_k: default_rrf_k(),
            max_references: default_max_references(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DetectorBackend {
    /// In-process pattern and lexicon scoring.
    Local,
    /// HTTP classifier returning `{"score": f32}`.
    Remote,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SafetyConfig {
    #[serde(default = "default_detector_backend")]
    pub toxicity_backend: DetectorBackend,
    #[serde(default)]
    pub toxicity_url: Option<String>,
    #[serde(default = "default_detector_backend")]
    pub jailbreak_backend: DetectorBackend,
    #[serde(default)]
    pub jailbreak_url: Option<String>,
    #[serde(default = "default_input_toxicity_threshold")]
    pub input_toxicity_threshold: f32,
    /// Stricter than the input threshold: generated output is user-facing.
    #[serde(default = "default_output_toxicity_threshold")]
    pub output_toxicity_threshold: f32,
    #[serde(default = "default_jailbreak_threshold")]
    pub jailbreak_threshold: f32,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            toxicity_backend: default_detector_backend(),
            toxicity_url: None,
            jailbreak_backend: default_detector_backend(),
            jailbreak_url: None,
            input_toxicity_threshold: default_input_toxicity_threshold(),
            output_toxicity_threshold: default_output_toxicity_threshold(),
            jailbreak_threshold: default_jailbreak_threshold(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkflowConfig {
    #[serde(default = "default_safety_timeout_secs")]
    pub safety_timeout_secs: u64,
    #[serde(default = "default_search_timeout_secs")]
    pub search_timeout_secs: u64,
    #[serde(default = "default_model_timeout_secs")]
    pub classify_timeout_secs: u64,
    #[serde(default = "default_model_timeout_secs")]
    pub recommend_timeout_secs: u64,
}

impl WorkflowConfig {
    pub fn timeouts(&self) -> StageTimeouts {
        StageTimeouts {
            safety: Duration::from_secs(self.safety_timeout_secs),
            search: Duration::from_secs(self.search_timeout_secs),
            classify: Duration::from_secs(self.classify_timeout_secs),
            recommend: Duration::from_secs(self.recommend_timeout_secs),
        }
    }
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            safety_timeout_secs: default_safety_timeout_secs(),
            search_timeout_secs: default_search_timeout_secs(),
            classify_timeout_secs: default_model_timeout_secs(),
            recommend_timeout_secs: default_model_timeout_secs(),
        }
    }
}

/// Per-stage deadlines for external calls.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub safety: Duration,
    pub search: Duration,
    pub classify: Duration,
    pub recommend: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        WorkflowConfig::default().timeouts()
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    /// Maximum characters per indexed chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Chunks embedded and upserted per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            batch_size: default_batch_size(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    pub token: String,
    #[serde(default)]
    pub webhook_secret: String,
    /// Post the recommendation as an issue comment after webhook triage.
    #[serde(default = "default_true")]
    pub publish_comments: bool,
    /// Apply the classified labels to the issue after webhook triage.
    #[serde(default)]
    pub apply_labels: bool,
}

// Manual Debug impl to avoid leaking the token and webhook secret
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .field("publish_comments", &self.publish_comments)
            .field("apply_labels", &self.apply_labels)
            .finish()
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_concurrent_triage() -> usize {
    4
}

fn default_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_max_tokens() -> u32 {
    2048
}

fn default_true() -> bool {
    true
}

fn default_rate_limit_max_retries() -> u32 {
    3
}

fn default_rate_limit_backoff_secs() -> u64 {
    2
}

fn default_dense_url() -> String {
    "http://localhost:8081".to_string()
}

fn default_sparse_url() -> String {
    "http://localhost:8082".to_string()
}

fn default_index_backend() -> IndexBackend {
    IndexBackend::Qdrant
}

fn default_qdrant_url() -> String {
    "http://localhost:6333".to_string()
}

fn default_app_env() -> String {
    "dev".to_string()
}

fn default_collection() -> String {
    "github_issues".to_string()
}

fn default_dense_size() -> usize {
    384
}

fn default_search_limit() -> usize {
    5
}

fn default_candidate_limit() -> usize {
    10
}

fn default_dense_threshold() -> f32 {
    0.9
}

fn default_rrf_k() -> f32 {
    2.0
}

fn default_max_references() -> usize {
    4
}

fn default_detector_backend() -> DetectorBackend {
    DetectorBackend::Local
}

fn default_input_toxicity_threshold() -> f32 {
    0.5
}

fn default_output_toxicity_threshold() -> f32 {
    0.3
}

fn default_jailbreak_threshold() -> f32 {
    0.9
}

fn default_safety_timeout_secs() -> u64 {
    10
}

fn default_search_timeout_secs() -> u64 {
    15
}

fn default_model_timeout_secs() -> u64 {
    60
}

fn default_chunk_size() -> usize {
    1000
}

fn default_batch_size() -> usize {
    20
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("triage").required(false));
        }

        // Environment variable overrides with TRIAGE__ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("TRIAGE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let config: AppConfig = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.max_concurrent_triage == 0 {
            return Err(AppError::Config(
                "server.max_concurrent_triage must be at least 1".to_string(),
            ));
        }
        if self.search.limit == 0 || self.search.candidate_limit == 0 {
            return Err(AppError::Config(
                "search.limit and search.candidate_limit must be positive".to_string(),
            ));
        }
        // k = 0 gives every top-ranked candidate an infinite score.
        if !(self.search.rrf_k > 0.0 && self.search.rrf_k.is_finite()) {
            return Err(AppError::Config(
                "search.rrf_k must be a positive number".to_string(),
            ));
        }
        if self.safety.output_toxicity_threshold > self.safety.input_toxicity_threshold {
            return Err(AppError::Config(
                "safety.output_toxicity_threshold must not be looser than the input threshold"
                    .to_string(),
            ));
        }
        if self.safety.toxicity_backend == DetectorBackend::Remote
            && self.safety.toxicity_url.is_none()
        {
            return Err(AppError::Config(
                "safety.toxicity_url is required for the remote backend".to_string(),
            ));
        }
        if self.safety.jailbreak_backend == DetectorBackend::Remote
            && self.safety.jailbreak_url.is_none()
        {
            return Err(AppError::Config(
                "safety.jailbreak_url is required for the remote backend".to_string(),
            ));
        }
        if self.ingest.chunk_size == 0 || self.ingest.batch_size == 0 {
            return Err(AppError::Config(
                "ingest.chunk_size and ingest.batch_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn claude_api_key(&self) -> &str {
        &self.claude.api_key
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.github
            .as_ref()
            .map(|g| g.webhook_secret.as_str())
            .filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Result<AppConfig> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;
        let config: AppConfig = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    #[test]
    fn test_defaults_match_original_thresholds() {
        let config = from_toml("[claude]\napi_key = \"k\"\n").unwrap();
        assert_eq!(config.search.limit, 5);
        assert_eq!(config.search.candidate_limit, 10);
        assert_eq!(config.search.max_references, 4);
        assert!((config.search.dense_threshold - 0.9).abs() < f32::EPSILON);
        assert_eq!(config.ingest.chunk_size, 1000);
        assert_eq!(config.ingest.batch_size, 20);
        assert_eq!(config.index.collection_name(), "dev_github_issues");
        assert!(config.github.is_none());
        assert!(config.webhook_secret().is_none());
    }

    #[test]
    fn test_rejects_looser_output_threshold() {
        let toml = "[claude]\napi_key = \"k\"\n[safety]\ninput_toxicity_threshold = 0.3\noutput_toxicity_threshold = 0.6\n";
        let err = from_toml(toml).unwrap_err();
        assert!(err.to_string().contains("output_toxicity_threshold"));
    }

    #[test]
    fn test_rejects_non_positive_rrf_k() {
        for k in ["0", "0.0", "-1.5"] {
            let toml = format!("[claude]\napi_key = \"k\"\n[search]\nrrf_k = {k}\n");
            let err = from_toml(&toml).unwrap_err();
            assert!(err.to_string().contains("rrf_k"), "rrf_k = {k}");
        }
        let toml = "[claude]\napi_key = \"k\"\n[search]\nrrf_k = 60.0\n";
        assert!((from_toml(toml).unwrap().search.rrf_k - 60.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_remote_backend_requires_url() {
        let toml = "[claude]\napi_key = \"k\"\n[safety]\ntoxicity_backend = \"remote\"\n";
        assert!(from_toml(toml).is_err());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let toml = "[claude]\napi_key = \"sk-secret\"\n[github]\ntoken = \"ghp_secret\"\nwebhook_secret = \"hook\"\n";
        let config = from_toml(toml).unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sk-secret"));
        assert!(!debug.contains("ghp_secret"));
        assert!(!debug.contains("hook\""));
        assert_eq!(config.webhook_secret(), Some("hook"));
    }
}
