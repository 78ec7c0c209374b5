pub mod chunk;

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

use crate::config::IngestConfig;
use crate::embedding::Embedder;
use crate::error::{AppError, Result};
use crate::index::{IndexPoint, PayloadFilter, VectorIndex};
use crate::models::Payload;
use crate::platform::types::{CommentRecord, IssueRecord};

pub use chunk::chunk_text;

/// Counters for one ingestion run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub issues: usize,
    pub comments: usize,
    pub skipped_empty: usize,
    pub skipped_existing: usize,
    pub chunks_upserted: usize,
    pub batches_upserted: usize,
    pub batches_failed: usize,
}

/// Loads issue comments into the vector index: one point per comment chunk,
/// carrying the payload the search side maps back into similar issues.
pub struct Ingestor {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    chunk_size: usize,
    batch_size: usize,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: &IngestConfig) -> Self {
        Self {
            embedder,
            index,
            chunk_size: config.chunk_size,
            batch_size: config.batch_size,
        }
    }

    pub async fn ingest(&self, issues: &[IssueRecord]) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        for issue in issues {
            let before = report.clone();
            self.ingest_issue(issue, &mut report).await?;
            report.issues += 1;

            tracing::info!(
                repo = %issue.full_name(),
                issue = issue.number,
                comments = issue.comments.len(),
                skipped = (report.skipped_empty + report.skipped_existing)
                    - (before.skipped_empty + before.skipped_existing),
                chunks = report.chunks_upserted - before.chunks_upserted,
                batches = report.batches_upserted - before.batches_upserted,
                "Issue processed"
            );
        }

        Ok(report)
    }

    async fn ingest_issue(&self, issue: &IssueRecord, report: &mut IngestReport) -> Result<()> {
        for comment in issue.comments_by_creation() {
            report.comments += 1;

            if comment.body.trim().is_empty() {
                tracing::debug!(issue = issue.number, comment = comment.id, "Skipping empty comment");
                report.skipped_empty += 1;
                continue;
            }

            let filter = PayloadFilter::new()
                .must_eq("issue_number", issue.number)
                .must_eq("comment_id", comment.id);
            if self.index.exists(&filter).await? {
                tracing::debug!(issue = issue.number, comment = comment.id, "Skipping comment, already ingested");
                report.skipped_existing += 1;
                continue;
            }

            let chunks: Vec<(usize, String)> = chunk_text(&comment.body, self.chunk_size)
                .into_iter()
                .enumerate()
                .collect();

            for batch in chunks.chunks(self.batch_size) {
                match self.upsert_batch(issue, comment, batch).await {
                    Ok(()) => {
                        report.batches_upserted += 1;
                        report.chunks_upserted += batch.len();
                    }
                    Err(e) => {
                        tracing::error!(
                            issue = issue.number,
                            comment = comment.id,
                            error = %e,
                            "Failed to upsert comment batch"
                        );
                        report.batches_failed += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn upsert_batch(
        &self,
        issue: &IssueRecord,
        comment: &CommentRecord,
        batch: &[(usize, String)],
    ) -> Result<()> {
        let texts: Vec<String> = batch.iter().map(|(_, text)| text.clone()).collect();
        let dense = self.embedder.embed_dense(&texts).await?;
        let sparse = self.embedder.embed_sparse(&texts).await?;
        if dense.len() != texts.len() || sparse.len() != texts.len() {
            return Err(AppError::Embedding(format!(
                "expected {} vectors, got {} dense and {} sparse",
                texts.len(),
                dense.len(),
                sparse.len()
            )));
        }

        let full_name = issue.full_name();
        let points = batch
            .iter()
            .zip(dense.into_iter().zip(sparse))
            .map(|((position, text), (dense, sparse))| IndexPoint {
                id: point_id(&full_name, issue.number, comment.id, *position),
                dense,
                sparse,
                payload: chunk_payload(issue, comment, text),
            })
            .collect();

        self.index.upsert(points).await
    }
}

fn chunk_payload(issue: &IssueRecord, comment: &CommentRecord, text: &str) -> Payload {
    let mut payload = Payload::new();
    payload.insert("issue_number".to_string(), json!(issue.number));
    payload.insert("repo".to_string(), json!(issue.repo));
    payload.insert("owner".to_string(), json!(issue.owner));
    payload.insert("chunk_text".to_string(), json!(text));
    payload.insert("comment_id".to_string(), json!(comment.id));
    payload.insert("url".to_string(), json!(issue.url));
    payload.insert("title".to_string(), json!(issue.title));
    payload.insert("is_bug".to_string(), json!(issue.is_bug));
    payload.insert("is_feature".to_string(), json!(issue.is_feature));
    payload
}

/// Stable point id for one chunk, so re-ingesting overwrites instead of duplicating.
pub fn point_id(repo_full_name: &str, issue_number: u64, comment_id: u64, chunk: usize) -> String {
    let name = format!("{repo_full_name}#{issue_number}/{comment_id}/{chunk}");
    Uuid::new_v5(&Uuid::NAMESPACE_URL, name.as_bytes()).to_string()
}

/// Read a JSON array of issue records.
pub async fn load_issues_file(path: &Path) -> Result<Vec<IssueRecord>> {
    let contents = tokio::fs::read(path).await?;
    let issues: Vec<IssueRecord> = serde_json::from_slice(&contents)?;
    tracing::info!(path = %path.display(), issues = issues.len(), "Loaded issue corpus");
    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::SparseVector;
    use crate::index::MemoryIndex;
    use crate::search::engine::tests::VocabEmbedder;
    use async_trait::async_trait;
    use std::io::Write;

    fn issue(comments: Vec<(u64, &str)>) -> IssueRecord {
        IssueRecord {
            owner: "scikit-learn".to_string(),
            repo: "scikit-learn".to_string(),
            number: 42,
            title: "HuberRegressor fit does not converge".to_string(),
            body: String::new(),
            url: "https://github.com/scikit-learn/scikit-learn/issues/42".to_string(),
            labels: vec!["Bug".to_string()],
            is_bug: true,
            is_feature: false,
            comments: comments
                .into_iter()
                .map(|(id, body)| CommentRecord {
                    id,
                    body: body.to_string(),
                    created_at: None,
                })
                .collect(),
        }
    }

    fn config(chunk_size: usize, batch_size: usize) -> IngestConfig {
        IngestConfig { chunk_size, batch_size }
    }

    #[tokio::test]
    async fn test_ingest_chunks_and_skips() {
        let index = Arc::new(MemoryIndex::new());
        let ingestor = Ingestor::new(Arc::new(VocabEmbedder::new()), index.clone(), &config(20, 2));

        let report = ingestor
            .ingest(&[issue(vec![
                (1, "HuberRegressor fit warning when the data is scaled badly"),
                (2, "   "),
                (3, "docs typo"),
            ])])
            .await
            .unwrap();

        assert_eq!(report.issues, 1);
        assert_eq!(report.comments, 3);
        assert_eq!(report.skipped_empty, 1);
        assert_eq!(report.skipped_existing, 0);
        // "HuberRegressor fit", "warning when the", "data is scaled badly" + "docs typo"
        assert_eq!(report.chunks_upserted, 4);
        assert_eq!(report.batches_upserted, 3);
        assert_eq!(index.len().await, 4);

        let filter = PayloadFilter::new()
            .must_eq("issue_number", 42)
            .must_eq("comment_id", 3)
            .must_eq("is_bug", true);
        assert!(index.exists(&filter).await.unwrap());
    }

    #[tokio::test]
    async fn test_rerun_skips_existing_comments() {
        let index = Arc::new(MemoryIndex::new());
        let ingestor = Ingestor::new(Arc::new(VocabEmbedder::new()), index.clone(), &config(1000, 20));
        let corpus = [issue(vec![(1, "model fit"), (2, "pipeline data")])];

        ingestor.ingest(&corpus).await.unwrap();
        let second = ingestor.ingest(&corpus).await.unwrap();

        assert_eq!(second.skipped_existing, 2);
        assert_eq!(second.chunks_upserted, 0);
        assert_eq!(index.len().await, 2);
    }

    struct FlakyEmbedder;

    #[async_trait]
    impl Embedder for FlakyEmbedder {
        async fn embed_dense(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if texts.iter().any(|t| t.contains("poison")) {
                return Err(AppError::Embedding("503".to_string()));
            }
            Ok(texts.iter().map(|_| vec![1.0, 0.0]).collect())
        }

        async fn embed_sparse(&self, texts: &[String]) -> Result<Vec<SparseVector>> {
            Ok(texts
                .iter()
                .map(|_| SparseVector { indices: vec![0], values: vec![1.0] })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_failed_batch_is_logged_and_skipped() {
        let index = Arc::new(MemoryIndex::new());
        let ingestor = Ingestor::new(Arc::new(FlakyEmbedder), index.clone(), &config(1000, 20));

        let report = ingestor
            .ingest(&[issue(vec![(1, "poison pill"), (2, "fine")])])
            .await
            .unwrap();

        assert_eq!(report.batches_failed, 1);
        assert_eq!(report.batches_upserted, 1);
        assert_eq!(index.len().await, 1);
    }

    #[test]
    fn test_point_ids_are_stable_and_distinct() {
        let a = point_id("o/r", 1, 10, 0);
        assert_eq!(a, point_id("o/r", 1, 10, 0));
        assert_ne!(a, point_id("o/r", 1, 10, 1));
        assert_ne!(a, point_id("o/r", 1, 11, 0));
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_load_issues_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"owner":"o","repo":"r","number":1,"title":"t","url":"https://github.com/o/r/issues/1",
                "comments":[{{"id":5,"body":"hello"}}]}}]"#
        )
        .unwrap();

        let issues = load_issues_file(file.path()).await.unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].comments[0].id, 5);
        assert!(issues[0].body.is_empty());
    }
}
