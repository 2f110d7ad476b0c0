use std::fmt;

use serde::{Deserialize, Serialize};

use crate::date::ReportDate;
use crate::types::{BranchName, RepoName};

/// A queued unit of work. Serialized as tagged JSON (`"type": "fetch_branch"`, etc.).
///
/// Jobs never reference each other; causality is implied by who enqueues whom.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Job {
    /// Fetch the tracked user's commits on one branch for one date.
    FetchBranch {
        repo: RepoName,
        branch: BranchName,
        date: ReportDate,
    },
    /// List a repository's feature branches and fan out fetches for unmerged ones.
    DiscoverFeatureBranches { repo: RepoName, date: ReportDate },
    /// Collect every partial result for the date into the final report.
    Aggregate { date: ReportDate },
}

impl Job {
    pub fn fetch(repo: impl Into<String>, branch: impl Into<String>, date: ReportDate) -> Self {
        Job::FetchBranch {
            repo: repo.into(),
            branch: branch.into(),
            date,
        }
    }

    pub fn discover(repo: impl Into<String>, date: ReportDate) -> Self {
        Job::DiscoverFeatureBranches {
            repo: repo.into(),
            date,
        }
    }

    pub fn aggregate(date: ReportDate) -> Self {
        Job::Aggregate { date }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Job::FetchBranch { .. } => "fetch_branch",
            Job::DiscoverFeatureBranches { .. } => "discover_feature_branches",
            Job::Aggregate { .. } => "aggregate",
        }
    }

    pub fn date(&self) -> ReportDate {
        match self {
            Job::FetchBranch { date, .. }
            | Job::DiscoverFeatureBranches { date, .. }
            | Job::Aggregate { date } => *date,
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::FetchBranch { repo, branch, date } => {
                write!(f, "fetch_branch {repo}/{branch} @ {date}")
            }
            Job::DiscoverFeatureBranches { repo, date } => {
                write!(f, "discover_feature_branches {repo} @ {date}")
            }
            Job::Aggregate { date } => write!(f, "aggregate @ {date}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d() -> ReportDate {
        ReportDate::parse("2024-01-05").unwrap()
    }

    #[test]
    fn fetch_branch_wire_format() {
        let job = Job::fetch("acme/api", "main", d());
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains(r#""type":"fetch_branch""#));
        assert!(json.contains(r#""repo":"acme/api""#));
        assert!(json.contains(r#""branch":"main""#));
        assert!(json.contains(r#""date":"2024-01-05""#));
    }

    #[test]
    fn parse_aggregate_message() {
        let job: Job = serde_json::from_str(r#"{"type":"aggregate","date":"2024-01-05"}"#).unwrap();
        assert_eq!(job, Job::aggregate(d()));
        assert_eq!(job.kind(), "aggregate");
    }

    #[test]
    fn rejects_unknown_kind_and_bad_date() {
        assert!(serde_json::from_str::<Job>(r#"{"type":"explode","date":"2024-01-05"}"#).is_err());
        assert!(
            serde_json::from_str::<Job>(r#"{"type":"aggregate","date":"01/05/2024"}"#).is_err()
        );
    }

    #[test]
    fn equality_is_structural() {
        assert_eq!(
            Job::discover("acme/api", d()),
            Job::discover("acme/api".to_string(), d())
        );
        assert_ne!(Job::fetch("a", "main", d()), Job::fetch("a", "staging", d()));
    }

    #[test]
    fn every_variant_carries_date() {
        for job in [
            Job::fetch("a", "main", d()),
            Job::discover("a", d()),
            Job::aggregate(d()),
        ] {
            assert_eq!(job.date(), d());
        }
    }
}
