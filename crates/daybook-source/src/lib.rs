//! Upstream code-host access: branch listing, merge status, commit listing.
//!
//! Non-2xx responses degrade to empty results after logging. Only transport
//! and decoding failures surface as errors, so the queue's redelivery is the
//! sole retry path.

pub mod fake;
pub mod filter;
pub mod github;
pub mod wire;

use daybook_core::{BranchRef, CommitRecord, ReportDate};

pub use fake::StaticSource;
pub use filter::CommitFilter;
pub use github::GitHubClient;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("http: {0}")]
    Http(#[from] ureq::Error),
    #[error("decoding response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("request task failed: {0}")]
    Join(String),
    #[error("{0}")]
    Injected(String),
}

#[async_trait::async_trait]
pub trait SourceClient: Send + Sync {
    /// Branches of `repo` (first page only).
    async fn list_branches(&self, repo: &str) -> Result<Vec<BranchRef>, SourceError>;

    /// True when `branch` is behind or identical to any of `bases`.
    /// A base that cannot be compared counts as "not merged into it".
    async fn is_merged(&self, repo: &str, branch: &str, bases: &[String]) -> bool;

    /// The tracked user's commits on `branch` whose committer date falls on `date` (UTC).
    async fn list_commits(
        &self,
        repo: &str,
        branch: &str,
        date: ReportDate,
    ) -> Result<Vec<CommitRecord>, SourceError>;
}

/// Compare statuses meaning the branch has nothing its base lacks.
pub fn merged_from_status(status: &str) -> bool {
    matches!(status, "behind" | "identical")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merged_statuses() {
        assert!(merged_from_status("behind"));
        assert!(merged_from_status("identical"));
        assert!(!merged_from_status("ahead"));
        assert!(!merged_from_status("diverged"));
        assert!(!merged_from_status(""));
    }
}
