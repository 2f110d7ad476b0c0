use serde::{Deserialize, Serialize};

use crate::date::ReportDate;

/// Repository identifier in `owner/name` form.
pub type RepoName = String;

/// Branch name (e.g. "main", "feat/login").
pub type BranchName = String;

/// A tracked repository and the base branches treated as its main line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRef {
    pub name: RepoName,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub base_branches: Vec<BranchName>,
}

impl RepositoryRef {
    pub fn new(name: impl Into<String>, base_branches: &[&str]) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            base_branches: base_branches.iter().map(|b| b.to_string()).collect(),
        }
    }

    pub fn is_base_branch(&self, branch: &str) -> bool {
        self.base_branches.iter().any(|b| b == branch)
    }
}

/// A branch as listed by the source host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    pub name: BranchName,
    #[serde(default)]
    pub head_sha: String,
}

/// Who authored or committed a change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub login: Option<String>,
    pub name: String,
    pub email: String,
}

impl Identity {
    /// Login when the host linked the commit to an account, display name otherwise.
    pub fn handle(&self) -> &str {
        self.login.as_deref().unwrap_or(&self.name)
    }

    pub fn matches_user(&self, user: &str) -> bool {
        self.handle().eq_ignore_ascii_case(user)
    }
}

/// One observed commit. `sha` is its global identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub date: ReportDate,
    pub message: String,
    pub sha: String,
    pub url: String,
    pub repository: RepoName,
    pub branch: BranchName,
    pub author: Identity,
    pub committer: Identity,
    /// Committer timestamp, RFC 3339.
    pub commit_date: String,
    /// Author timestamp, RFC 3339.
    pub author_date: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoSummary {
    pub repository: RepoName,
    pub commit_count: usize,
}

/// The finalized artifact for one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub date: ReportDate,
    pub total_commits: usize,
    /// Number of distinct repositories with at least one commit.
    pub repositories: usize,
    pub generated_at: String,
    pub summary: Vec<RepoSummary>,
    pub commits: Vec<CommitRecord>,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.total_commits == 0
    }

    pub fn shas(&self) -> Vec<&str> {
        self.commits.iter().map(|c| c.sha.as_str()).collect()
    }
}

/// Expected vs. completed units of work for one date. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressTracker {
    pub total_units: usize,
    pub completed_units: usize,
    pub started_at: String,
}

/// Fan-out confirmation written by feature-branch discovery for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryRecord {
    /// Unmerged feature branches a fetch job was enqueued for.
    pub branches: Vec<BranchName>,
    pub discovered_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ident(login: Option<&str>, name: &str) -> Identity {
        Identity {
            login: login.map(String::from),
            name: name.into(),
            email: format!("{name}@example.com"),
        }
    }

    #[test]
    fn handle_prefers_login() {
        assert_eq!(ident(Some("octocat"), "The Octocat").handle(), "octocat");
        assert_eq!(ident(None, "The Octocat").handle(), "The Octocat");
    }

    #[test]
    fn matches_user_case_insensitive() {
        assert!(ident(Some("OctoCat"), "x").matches_user("octocat"));
        assert!(ident(None, "octocat").matches_user("OCTOCAT"));
        assert!(!ident(Some("someone"), "octocat").matches_user("octocat"));
    }

    #[test]
    fn commit_record_uses_camel_case() {
        let c = CommitRecord {
            date: ReportDate::parse("2024-01-05").unwrap(),
            message: "fix: things".into(),
            sha: "abc".into(),
            url: "https://github.com/a/b/commit/abc".into(),
            repository: "a/b".into(),
            branch: "main".into(),
            author: ident(Some("octocat"), "Octo"),
            committer: ident(None, "GitHub"),
            commit_date: "2024-01-05T10:00:00Z".into(),
            author_date: "2024-01-05T09:00:00Z".into(),
        };
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["commitDate"], "2024-01-05T10:00:00Z");
        assert_eq!(json["authorDate"], "2024-01-05T09:00:00Z");
        assert_eq!(json["date"], "2024-01-05");
        assert!(json["committer"]["login"].is_null());
    }

    #[test]
    fn report_field_names() {
        let r = Report {
            date: ReportDate::parse("2024-01-05").unwrap(),
            total_commits: 0,
            repositories: 0,
            generated_at: "2024-01-06T00:00:00.000Z".into(),
            summary: vec![],
            commits: vec![],
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["totalCommits"], 0);
        assert_eq!(json["generatedAt"], "2024-01-06T00:00:00.000Z");
        assert!(r.is_empty());
    }

    #[test]
    fn base_branch_lookup() {
        let repo = RepositoryRef::new("acme/api", &["main", "staging"]);
        assert!(repo.is_base_branch("staging"));
        assert!(!repo.is_base_branch("feat/x"));
    }
}
