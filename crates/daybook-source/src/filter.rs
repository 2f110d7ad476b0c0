use daybook_core::{CommitRecord, Identity, ReportDate};

use crate::wire;

/// Keeps commits committed on one UTC day by one user.
///
/// The user matches when either the author's or the committer's handle
/// (login, else display name) equals it ignoring ASCII case.
#[derive(Debug, Clone)]
pub struct CommitFilter {
    pub date: ReportDate,
    pub user: String,
}

impl CommitFilter {
    pub fn new(date: ReportDate, user: impl Into<String>) -> Self {
        Self {
            date,
            user: user.into(),
        }
    }

    pub fn accepts(&self, record: &CommitRecord) -> bool {
        ReportDate::utc_day_of(&record.commit_date) == Some(self.date)
            && (record.author.matches_user(&self.user) || record.committer.matches_user(&self.user))
    }

    /// Convert a page of raw commits and keep the accepted ones, in page order.
    pub fn apply(&self, repo: &str, branch: &str, page: Vec<wire::Commit>) -> Vec<CommitRecord> {
        page.into_iter()
            .filter_map(|raw| to_record(repo, branch, raw))
            .filter(|record| self.accepts(record))
            .collect()
    }
}

/// `None` when the committer timestamp has no recognizable day.
fn to_record(repo: &str, branch: &str, raw: wire::Commit) -> Option<CommitRecord> {
    let date = ReportDate::utc_day_of(&raw.commit.committer.date)?;
    Some(CommitRecord {
        date,
        message: raw.commit.message.trim().to_string(),
        sha: raw.sha,
        url: raw.html_url,
        repository: repo.to_string(),
        branch: branch.to_string(),
        author: Identity {
            login: raw.author.map(|a| a.login),
            name: raw.commit.author.name,
            email: raw.commit.author.email,
        },
        committer: Identity {
            login: raw.committer.map(|a| a.login),
            name: raw.commit.committer.name,
            email: raw.commit.committer.email,
        },
        commit_date: raw.commit.committer.date,
        author_date: raw.commit.author.date,
    })
}
