//! In-process source with scripted branches, compare results and commits.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use daybook_core::{BranchRef, CommitRecord, Identity, ReportDate};

use crate::filter::CommitFilter;
use crate::{merged_from_status, SourceClient, SourceError};

/// One recorded call, for assertions on fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceCall {
    ListBranches { repo: String },
    IsMerged { repo: String, branch: String },
    ListCommits { repo: String, branch: String },
}

/// Scripted [`SourceClient`]. Commits pass through the same [`CommitFilter`]
/// as the real client, so scripts may include off-day or foreign commits.
pub struct StaticSource {
    user: String,
    branches: Mutex<HashMap<String, Vec<String>>>,
    compare: Mutex<HashMap<(String, String, String), String>>,
    commits: Mutex<HashMap<(String, String), Vec<CommitRecord>>>,
    failing: Mutex<HashSet<(String, String)>>,
    calls: Mutex<Vec<SourceCall>>,
}

/// Poisoned locks are recovered; a panicked caller must not wedge the fake.
fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StaticSource {
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            branches: Mutex::new(HashMap::new()),
            compare: Mutex::new(HashMap::new()),
            commits: Mutex::new(HashMap::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn set_branches(&self, repo: &str, names: &[&str]) {
        locked(&self.branches)
            .insert(repo.to_string(), names.iter().map(|n| n.to_string()).collect());
    }

    /// Script the compare status of `branch` against `base`. Unscripted pairs
    /// behave like a failed compare.
    pub fn set_compare(&self, repo: &str, base: &str, branch: &str, status: &str) {
        locked(&self.compare).insert(
            (repo.to_string(), base.to_string(), branch.to_string()),
            status.to_string(),
        );
    }

    pub fn set_commits(&self, repo: &str, branch: &str, commits: Vec<CommitRecord>) {
        locked(&self.commits).insert((repo.to_string(), branch.to_string()), commits);
    }

    /// Make `list_commits` for this branch fail with a transport-style error.
    pub fn fail_commits(&self, repo: &str, branch: &str) {
        locked(&self.failing).insert((repo.to_string(), branch.to_string()));
    }

    pub fn heal_commits(&self, repo: &str, branch: &str) {
        locked(&self.failing).remove(&(repo.to_string(), branch.to_string()));
    }

    pub fn calls(&self) -> Vec<SourceCall> {
        locked(&self.calls).clone()
    }

    fn record(&self, call: SourceCall) {
        locked(&self.calls).push(call);
    }
}

#[async_trait::async_trait]
impl SourceClient for StaticSource {
    async fn list_branches(&self, repo: &str) -> Result<Vec<BranchRef>, SourceError> {
        self.record(SourceCall::ListBranches {
            repo: repo.to_string(),
        });
        let branches = locked(&self.branches);
        Ok(branches
            .get(repo)
            .map(|names| {
                names
                    .iter()
                    .map(|n| BranchRef {
                        name: n.clone(),
                        head_sha: String::new(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn is_merged(&self, repo: &str, branch: &str, bases: &[String]) -> bool {
        self.record(SourceCall::IsMerged {
            repo: repo.to_string(),
            branch: branch.to_string(),
        });
        let compare = locked(&self.compare);
        bases.iter().any(|base| {
            compare
                .get(&(repo.to_string(), base.clone(), branch.to_string()))
                .is_some_and(|status| merged_from_status(status))
        })
    }

    async fn list_commits(
        &self,
        repo: &str,
        branch: &str,
        date: ReportDate,
    ) -> Result<Vec<CommitRecord>, SourceError> {
        self.record(SourceCall::ListCommits {
            repo: repo.to_string(),
            branch: branch.to_string(),
        });
        let key = (repo.to_string(), branch.to_string());
        if locked(&self.failing).contains(&key) {
            return Err(SourceError::Injected(format!(
                "scripted failure listing {repo}/{branch}"
            )));
        }
        let filter = CommitFilter::new(date, self.user.as_str());
        let commits = locked(&self.commits);
        Ok(commits
            .get(&key)
            .map(|list| list.iter().filter(|c| filter.accepts(c)).cloned().collect())
            .unwrap_or_default())
    }
}

/// A commit by `login` on `repo`/`branch`, committed at `commit_date`.
pub fn commit(repo: &str, branch: &str, sha: &str, commit_date: &str, login: &str) -> CommitRecord {
    let identity = Identity {
        login: Some(login.to_string()),
        name: login.to_string(),
        email: format!("{login}@users.noreply.github.com"),
    };
    CommitRecord {
        date: ReportDate::utc_day_of(commit_date).unwrap_or_else(ReportDate::today_utc),
        message: format!("commit {sha}"),
        sha: sha.to_string(),
        url: format!("https://github.com/{repo}/commit/{sha}"),
        repository: repo.to_string(),
        branch: branch.to_string(),
        author: identity.clone(),
        committer: identity,
        commit_date: commit_date.to_string(),
        author_date: commit_date.to_string(),
    }
}
