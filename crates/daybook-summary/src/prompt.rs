use daybook_core::summary_text::{DATE_PREFIX, DONE, IMPACT, METRICS, NONE};
use daybook_core::{Report, RepositoryRef};

fn repository_context(repos: &[RepositoryRef]) -> String {
    repos
        .iter()
        .map(|r| {
            if r.description.is_empty() {
                format!("- {}", r.name)
            } else {
                format!("- {}: {}", r.name, r.description)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// The single user message sent to the completion endpoint.
pub fn build_prompt(report: &Report, repos: &[RepositoryRef]) -> String {
    let report_json =
        serde_json::to_string_pretty(report).unwrap_or_else(|_| "{}".to_string());
    let context = repository_context(repos);

    format!(
        r#"You write daily work summaries from raw git activity for non-technical stakeholders.

Repositories, with what each one is for:

{context}

The day's activity as JSON ("dailyReport"): date, totalCommits, repositories,
summary (per-repository commit counts) and commits (message, repository,
branch, author, committer, commitDate).

```json
{report_json}
```

If the report has no commits, answer exactly:

{DATE_PREFIX} <date>

{NONE}

Otherwise answer in English with this structure:

{DATE_PREFIX} <date>

{DONE}
[Area] What was done and why it matters.

{IMPACT}
- Benefits for users, operations or the business.

{METRICS}
Total commits: <totalCommits>
Repositories touched: <repositories>

Rules:
- Never mention repository names, branches, SHAs or file names. Derive a
  human-friendly area label from each repository's description instead.
- Group related commits under one bullet.
- De-emphasize merge commits and chore, CI or refactor-only work unless it
  has a visible effect.
- Only summarize what is in the data. Do not invent blockers or next steps.
- 3 to 7 bullets in {DONE}, 2 to 4 in {IMPACT}, under 250 words in total."#
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::{RepoSummary, ReportDate};

    fn report() -> Report {
        Report {
            date: ReportDate::parse("2024-01-05").unwrap(),
            total_commits: 3,
            repositories: 1,
            generated_at: "2024-01-06T00:00:00.000Z".into(),
            summary: vec![RepoSummary {
                repository: "acme/api".into(),
                commit_count: 3,
            }],
            commits: vec![],
        }
    }

    #[test]
    fn prompt_carries_context_and_payload() {
        let mut api = RepositoryRef::new("acme/api", &["main"]);
        api.description = "Core backend".into();
        let bare = RepositoryRef::new("acme/tools", &["main"]);
        let p = build_prompt(&report(), &[api, bare]);
        assert!(p.contains("- acme/api: Core backend"));
        assert!(p.contains("- acme/tools\n") || p.ends_with("- acme/tools"));
        assert!(p.contains("\"totalCommits\": 3"));
        assert!(p.contains("DONE"));
        assert!(p.contains("IMPACT"));
        assert!(p.contains("METRICS"));
    }
}
