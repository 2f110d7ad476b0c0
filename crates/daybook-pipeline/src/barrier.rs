//! Completion barrier for the aggregate job.
//!
//! A date is settled when every base unit has a partial result, every
//! repository has a discovery record, and every branch named in a discovery
//! record has a partial result. Discovery writes its record only after its
//! fetch jobs are enqueued, so a settled date has no fan-out left in flight.

use std::collections::BTreeMap;
use std::time::Duration;

use daybook_core::{BranchName, Registry, RepoName, ReportDate};
use daybook_store::{CoordinationStore, StoreError};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// One (repository, branch) unit of fetch work.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Unit {
    pub repo: RepoName,
    pub branch: BranchName,
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.repo, self.branch)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BarrierState {
    /// Units expected so far: base units plus recorded discovered units.
    pub expected: Vec<Unit>,
    /// Expected units without a partial result.
    pub missing: Vec<Unit>,
    /// Repositories whose discovery has not recorded its fan-out.
    pub undiscovered: Vec<RepoName>,
    /// Recorded fan-out per repository.
    pub discovered: BTreeMap<RepoName, Vec<BranchName>>,
}

impl BarrierState {
    pub fn is_settled(&self) -> bool {
        self.missing.is_empty() && self.undiscovered.is_empty()
    }

    pub fn completed(&self) -> usize {
        self.expected.len() - self.missing.len()
    }
}

pub fn inspect(
    store: &CoordinationStore,
    registry: &Registry,
    date: ReportDate,
) -> Result<BarrierState, StoreError> {
    let mut state = BarrierState::default();
    for repo in &registry.repositories {
        let mut units: Vec<BranchName> = repo.base_branches.clone();
        match store.discovery(date, &repo.name)? {
            Some(record) => {
                units.extend(record.branches.iter().cloned());
                state.discovered.insert(repo.name.clone(), record.branches);
            }
            None => state.undiscovered.push(repo.name.clone()),
        }
        for branch in units {
            let unit = Unit {
                repo: repo.name.clone(),
                branch,
            };
            if !store.has_partial(date, &unit.repo, &unit.branch)? {
                state.missing.push(unit.clone());
            }
            state.expected.push(unit);
        }
    }
    Ok(state)
}

/// True once `settle_timeout` has elapsed since `started_at`. An unreadable
/// start time counts as elapsed.
pub fn deadline_passed(started_at: &str, settle_timeout: Duration, now: OffsetDateTime) -> bool {
    let Ok(started) = OffsetDateTime::parse(started_at, &Rfc3339) else {
        return true;
    };
    now - started >= settle_timeout
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use daybook_core::{BranchConvention, DiscoveryRecord, RepositoryRef};
    use daybook_store::{MemoryStore, Ttls};

    fn d() -> ReportDate {
        ReportDate::parse("2024-01-05").unwrap()
    }

    fn registry() -> Registry {
        Registry {
            user: "octocat".into(),
            repositories: vec![
                RepositoryRef::new("acme/api", &["main"]),
                RepositoryRef::new("acme/web", &["main", "staging"]),
            ],
            convention: BranchConvention::default(),
        }
    }

    fn store() -> CoordinationStore {
        CoordinationStore::new(Arc::new(MemoryStore::new()), Ttls::default())
    }

    fn record(branches: &[&str]) -> DiscoveryRecord {
        DiscoveryRecord {
            branches: branches.iter().map(|b| b.to_string()).collect(),
            discovered_at: "2024-01-05T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn fresh_date_is_unsettled() {
        let s = inspect(&store(), &registry(), d()).unwrap();
        assert!(!s.is_settled());
        assert_eq!(s.missing.len(), 3);
        assert_eq!(s.undiscovered, vec!["acme/api", "acme/web"]);
    }

    #[test]
    fn settles_once_fanout_lands() {
        let store = store();
        for (repo, branch) in [("acme/api", "main"), ("acme/web", "main"), ("acme/web", "staging")] {
            store.put_partial(d(), repo, branch, &[]).unwrap();
        }
        store.put_discovery(d(), "acme/api", &record(&[])).unwrap();
        store.put_discovery(d(), "acme/web", &record(&["feat/x"])).unwrap();

        let s = inspect(&store, &registry(), d()).unwrap();
        assert!(!s.is_settled());
        assert_eq!(
            s.missing,
            vec![Unit {
                repo: "acme/web".into(),
                branch: "feat/x".into()
            }]
        );
        assert_eq!(s.expected.len(), 4);

        store.put_partial(d(), "acme/web", "feat/x", &[]).unwrap();
        let s = inspect(&store, &registry(), d()).unwrap();
        assert!(s.is_settled());
        assert_eq!(s.completed(), 4);
    }

    #[test]
    fn deadline() {
        let now = OffsetDateTime::parse("2024-01-05T10:10:00Z", &Rfc3339).unwrap();
        let ten_min = Duration::from_secs(600);
        assert!(deadline_passed("2024-01-05T10:00:00.000Z", ten_min, now));
        assert!(!deadline_passed("2024-01-05T10:00:01.000Z", ten_min, now));
        assert!(deadline_passed("garbage", ten_min, now));
    }
}
