use std::collections::{BTreeMap, HashSet};

use daybook_core::{CommitRecord, RepoSummary, Report, ReportDate};

/// Assemble the final report from collected partial results.
///
/// Keeps the first record seen for each sha, then orders by repository and
/// committer timestamp. The timestamp comparison is lexicographic, which is
/// chronological for the fixed-width RFC 3339 form the host returns.
pub fn build_report(date: ReportDate, collected: Vec<CommitRecord>, generated_at: String) -> Report {
    let mut seen = HashSet::new();
    let mut commits: Vec<CommitRecord> = collected
        .into_iter()
        .filter(|c| seen.insert(c.sha.clone()))
        .collect();
    commits.sort_by(|a, b| {
        a.repository
            .cmp(&b.repository)
            .then_with(|| a.commit_date.cmp(&b.commit_date))
    });

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for c in &commits {
        *counts.entry(c.repository.as_str()).or_default() += 1;
    }
    let summary: Vec<RepoSummary> = counts
        .into_iter()
        .map(|(repository, commit_count)| RepoSummary {
            repository: repository.to_string(),
            commit_count,
        })
        .collect();

    Report {
        date,
        total_commits: commits.len(),
        repositories: summary.len(),
        generated_at,
        summary,
        commits,
    }
}
