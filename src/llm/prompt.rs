use crate::models::{Classification, SimilarIssue};

/// Characters of each neighbour's chunk quoted into prompts.
const CHUNK_EXCERPT_CHARS: usize = 400;

pub fn classification_prompt(title: &str, body: &str, similar_issues: &[SimilarIssue]) -> String {
    format!(
        r#"Classify the following GitHub issue.

## Issue
**Title:** {title}

**Description:**
{body}

## Similar historical issues
{neighbours}

## Instructions
- `category`: one of bug, feature, documentation, question, performance, other.
- `priority`: one of low, medium, high, critical.
- `labels`: short repository labels that fit the issue.
- `assignee`: the team or maintainer best placed to handle it, or "unassigned".
Use the similar issues only as supporting evidence. Respond by calling the tool."#,
        neighbours = format_neighbours(similar_issues),
    )
}

pub fn summary_prompt(
    title: &str,
    body: &str,
    classification: Option<&Classification>,
    similar_issues: &[SimilarIssue],
    references: &[String],
) -> String {
    let classification_section = match classification {
        Some(c) => format!(
            "**Category:** {}\n**Priority:** {}\n**Labels:** {}\n**Assignee:** {}",
            c.category,
            c.priority,
            c.labels.iter().cloned().collect::<Vec<_>>().join(", "),
            c.assignee
        ),
        None => "Not available.".to_string(),
    };

    let references_section = if references.is_empty() {
        "No related issues were found.".to_string()
    } else {
        references
            .iter()
            .map(|url| format!("- {url}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"Write a short recommendation for the maintainers of this GitHub issue.

## Issue
**Title:** {title}

**Description:**
{body}

## Classification
{classification_section}

## Retrieved context
{neighbours}

## References
{references_section}

## Guidelines
- Summarize the likely cause and a concrete next step in a few sentences.
- When retrieved context is present, say how it relates and cite the reference links.
- Stay professional and neutral; do not include credentials or personal remarks."#,
        neighbours = format_neighbours(similar_issues),
    )
}

fn format_neighbours(similar_issues: &[SimilarIssue]) -> String {
    if similar_issues.is_empty() {
        return "None.".to_string();
    }

    similar_issues
        .iter()
        .map(|issue| {
            let number = issue
                .issue_number
                .map(|n| format!("#{n}"))
                .unwrap_or_else(|| "#?".to_string());
            let excerpt: String = issue
                .chunk_text
                .as_deref()
                .unwrap_or_default()
                .chars()
                .take(CHUNK_EXCERPT_CHARS)
                .collect();
            format!(
                "- {number} {} (score {:.3}){}\n  {excerpt}",
                issue.title.as_deref().unwrap_or("untitled"),
                issue.score,
                issue
                    .url
                    .as_deref()
                    .map(|u| format!(" <{u}>"))
                    .unwrap_or_default(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_prompt_lists_references() {
        let prompt = summary_prompt(
            "Bug in HuberRegressor",
            "Unexpected behaviour",
            None,
            &[],
            &["https://github.com/o/r/issues/1".to_string()],
        );
        assert!(prompt.contains("- https://github.com/o/r/issues/1"));
        assert!(prompt.contains("Not available."));
        assert!(prompt.contains("## Retrieved context\nNone."));
    }

    #[test]
    fn test_neighbour_excerpt_is_truncated() {
        let issue = SimilarIssue {
            issue_number: Some(9),
            repo: None,
            owner: None,
            title: Some("Long".to_string()),
            url: None,
            comment_id: None,
            chunk_text: Some("x".repeat(1000)),
            score: 0.1,
            is_bug: None,
            is_feature: None,
        };
        let prompt = classification_prompt("t", "b", &[issue]);
        assert!(prompt.contains("#9 Long"));
        assert!(!prompt.contains(&"x".repeat(CHUNK_EXCERPT_CHARS + 1)));
    }
}
