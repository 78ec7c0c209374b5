use async_trait::async_trait;
use octocrab::models::issues::{Comment, Issue};
use octocrab::{params, Octocrab};

use crate::config::GitHubConfig;
use crate::error::{AppError, Result};
use crate::platform::types::IssueRecord;
use crate::platform::Platform;

use super::mapper;

const PER_PAGE: u8 = 100;

pub struct GitHubPlatform {
    client: Octocrab,
}

impl GitHubPlatform {
    pub fn new(config: &GitHubConfig) -> Result<Self> {
        let client = Octocrab::builder()
            .personal_token(config.token.clone())
            .build()
            .map_err(|e| AppError::GitHubApi(format!("Failed to build octocrab client: {e}")))?;
        Ok(Self { client })
    }

    pub fn parse_repo(repo_full_name: &str) -> Result<(&str, &str)> {
        match repo_full_name.split_once('/') {
            Some((owner, repo)) if !owner.is_empty() && !repo.is_empty() => Ok((owner, repo)),
            _ => Err(AppError::GitHubApi(format!(
                "Invalid repo name: {repo_full_name}"
            ))),
        }
    }

    async fn list_comments(&self, owner: &str, repo: &str, issue_number: u64) -> Result<Vec<Comment>> {
        let mut page = self
            .client
            .issues(owner, repo)
            .list_comments(issue_number)
            .per_page(PER_PAGE)
            .send()
            .await?;

        let mut comments = Vec::new();
        loop {
            comments.append(&mut page.items);
            match self.client.get_page::<Comment>(&page.next).await? {
                Some(next) => page = next,
                None => break,
            }
        }
        Ok(comments)
    }
}

#[async_trait]
impl Platform for GitHubPlatform {
    async fn post_comment(&self, repo_full_name: &str, issue_number: u64, body: &str) -> Result<()> {
        let (owner, repo) = Self::parse_repo(repo_full_name)?;

        self.client
            .issues(owner, repo)
            .create_comment(issue_number, body)
            .await?;

        Ok(())
    }

    async fn add_labels(&self, repo_full_name: &str, issue_number: u64, labels: &[String]) -> Result<()> {
        if labels.is_empty() {
            return Ok(());
        }
        let (owner, repo) = Self::parse_repo(repo_full_name)?;

        self.client
            .issues(owner, repo)
            .add_labels(issue_number, labels)
            .await?;

        Ok(())
    }

    async fn list_issues_with_comments(
        &self,
        repo_full_name: &str,
        limit: Option<usize>,
    ) -> Result<Vec<IssueRecord>> {
        let (owner, repo) = Self::parse_repo(repo_full_name)?;
        let limit = limit.unwrap_or(usize::MAX);
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut page = self
            .client
            .issues(owner, repo)
            .list()
            .state(params::State::All)
            .per_page(PER_PAGE)
            .send()
            .await?;

        let mut issues: Vec<Issue> = Vec::new();
        loop {
            // The issues endpoint also returns pull requests.
            let full = collect_up_to(
                page.items.drain(..),
                |issue| issue.pull_request.is_none(),
                &mut issues,
                limit,
            );
            if full {
                break;
            }
            match self.client.get_page::<Issue>(&page.next).await? {
                Some(next) => page = next,
                None => break,
            }
        }

        tracing::info!(repo = repo_full_name, issues = issues.len(), "Fetched issues");

        let mut records = Vec::with_capacity(issues.len());
        for issue in &issues {
            let comments = if issue.comments > 0 {
                self.list_comments(owner, repo, issue.number).await?
            } else {
                Vec::new()
            };
            records.push(mapper::map_issue(owner, repo, issue, comments));
        }
        Ok(records)
    }
}

/// Move kept items into `out` until it holds `limit`. Returns whether the
/// limit was reached.
fn collect_up_to<T>(
    items: impl IntoIterator<Item = T>,
    keep: impl Fn(&T) -> bool,
    out: &mut Vec<T>,
    limit: usize,
) -> bool {
    for item in items {
        if out.len() >= limit {
            break;
        }
        if keep(&item) {
            out.push(item);
        }
    }
    out.len() >= limit
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repo() {
        assert_eq!(
            GitHubPlatform::parse_repo("scikit-learn/scikit-learn").unwrap(),
            ("scikit-learn", "scikit-learn")
        );
        assert!(GitHubPlatform::parse_repo("no-slash").is_err());
        assert!(GitHubPlatform::parse_repo("/repo").is_err());
    }

    #[test]
    fn test_collect_up_to_respects_limit() {
        let odd = |n: &u32| n % 2 == 1;

        let mut out = Vec::new();
        assert!(collect_up_to(1..=9, odd, &mut out, 0));
        assert!(out.is_empty());

        assert!(!collect_up_to(1..=4, odd, &mut out, 3));
        assert_eq!(out, vec![1, 3]);
        assert!(collect_up_to(5..=9, odd, &mut out, 3));
        assert_eq!(out, vec![1, 3, 5]);
    }
}
