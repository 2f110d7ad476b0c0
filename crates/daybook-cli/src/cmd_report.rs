use std::fmt::Write;
use std::path::Path;

use anyhow::bail;
use daybook_core::{Report, ReportDate};

use crate::wiring::{self, Durable};

pub fn execute(config_path: &Path, date: &str, summary: bool, json: bool) -> anyhow::Result<()> {
    let date = ReportDate::parse(date)?;
    let config = wiring::load_config(config_path)?;
    let durable = Durable::open(&config)?;

    if summary {
        match durable.summaries.get(date)? {
            Some(text) => println!("{text}"),
            None => bail!("no summary for {date}"),
        }
        return Ok(());
    }

    let store = durable.coordination(&config);
    if json {
        match store.report_json(date)? {
            Some(raw) => println!("{raw}"),
            None => bail!("no report for {date}"),
        }
        return Ok(());
    }
    match store.report(date)? {
        Some(report) => print!("{}", render(&report)),
        None => bail!("no report for {date} (run `daybook trigger --date {date}`)"),
    }
    Ok(())
}

pub fn progress(config_path: &Path, date: &str) -> anyhow::Result<()> {
    let date = ReportDate::parse(date)?;
    let config = wiring::load_config(config_path)?;
    let view = Durable::open(&config)?.pipeline(&config).progress(date)?;
    println!("{}", serde_json::to_string_pretty(&view)?);
    Ok(())
}

/// Plain-text listing grouped by repository.
pub fn render(report: &Report) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{}: {} commits in {} repositories",
        report.date, report.total_commits, report.repositories
    );
    let mut current: Option<&str> = None;
    for commit in &report.commits {
        if current != Some(commit.repository.as_str()) {
            let _ = writeln!(out, "\n{}", commit.repository);
            current = Some(commit.repository.as_str());
        }
        let short = commit.sha.get(..7).unwrap_or(&commit.sha);
        let subject = commit.message.lines().next().unwrap_or_default();
        let _ = writeln!(out, "  {short} [{}] {subject}", commit.branch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::{CommitRecord, Identity, RepoSummary};

    fn commit(repo: &str, sha: &str, message: &str) -> CommitRecord {
        let who = Identity {
            login: Some("octocat".into()),
            name: "Octo Cat".into(),
            email: "octo@example.com".into(),
        };
        CommitRecord {
            date: ReportDate::parse("2024-01-05").unwrap(),
            message: message.into(),
            sha: sha.into(),
            url: format!("https://github.com/{repo}/commit/{sha}"),
            repository: repo.into(),
            branch: "main".into(),
            author: who.clone(),
            committer: who,
            commit_date: "2024-01-05T09:00:00Z".into(),
            author_date: "2024-01-05T09:00:00Z".into(),
        }
    }

    #[test]
    fn render_groups_by_repository() {
        let report = Report {
            date: ReportDate::parse("2024-01-05").unwrap(),
            total_commits: 3,
            repositories: 2,
            generated_at: "2024-01-05T23:59:00Z".into(),
            summary: vec![
                RepoSummary {
                    repository: "acme/api".into(),
                    commit_count: 2,
                },
                RepoSummary {
                    repository: "acme/web".into(),
                    commit_count: 1,
                },
            ],
            commits: vec![
                commit("acme/api", "0123456789abcdef", "Add login\n\nLong body"),
                commit("acme/api", "abc", "Fix typo"),
                commit("acme/web", "fedcba9876543210", "Nav bar"),
            ],
        };
        let text = render(&report);
        assert!(text.starts_with("2024-01-05: 3 commits in 2 repositories\n"));
        assert_eq!(text.matches("acme/api\n").count(), 1);
        assert!(text.contains("  0123456 [main] Add login\n"));
        assert!(text.contains("  abc [main] Fix typo\n"));
        assert!(!text.contains("Long body"));
    }

    #[test]
    fn render_empty_day() {
        let report = Report {
            date: ReportDate::parse("2024-01-05").unwrap(),
            total_commits: 0,
            repositories: 0,
            generated_at: "2024-01-05T23:59:00Z".into(),
            summary: vec![],
            commits: vec![],
        };
        assert_eq!(render(&report), "2024-01-05: 0 commits in 0 repositories\n");
    }
}
