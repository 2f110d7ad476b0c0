//! Progress accounting.
//!
//! The stored [`ProgressTracker`] is a read-modify-write counter. Concurrent
//! handlers can lose updates, so it is advisory only. [`ProgressSnapshot`] is
//! recomputed from the per-unit keys and does not race.

use daybook_core::{ProgressTracker, Registry, ReportDate};
use daybook_store::{CoordinationStore, StoreError};
use serde::Serialize;

use crate::{barrier, Pipeline};

/// Count one finished unit. No-op when the tracker is gone (finalized or expired).
pub fn record_completion(store: &CoordinationStore, date: ReportDate) -> Result<(), StoreError> {
    if let Some(mut tracker) = store.progress(date)? {
        tracker.completed_units += 1;
        store.put_progress(date, &tracker)?;
    }
    Ok(())
}

/// Grow the expected unit count by `units` discovered branches.
pub fn add_units(store: &CoordinationStore, date: ReportDate, units: usize) -> Result<(), StoreError> {
    if units == 0 {
        return Ok(());
    }
    if let Some(mut tracker) = store.progress(date)? {
        tracker.total_units += units;
        store.put_progress(date, &tracker)?;
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub expected_units: usize,
    pub completed_units: usize,
    pub repositories: usize,
    pub discovered_repositories: usize,
    pub settled: bool,
}

/// What `daybook progress` and `GET /api/progress/{date}` show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressView {
    pub date: ReportDate,
    pub tracker: Option<ProgressTracker>,
    pub snapshot: ProgressSnapshot,
    pub report_ready: bool,
}

pub fn snapshot(
    store: &CoordinationStore,
    registry: &Registry,
    date: ReportDate,
) -> Result<ProgressSnapshot, StoreError> {
    let state = barrier::inspect(store, registry, date)?;
    Ok(ProgressSnapshot {
        expected_units: state.expected.len(),
        completed_units: state.completed(),
        repositories: registry.repositories.len(),
        discovered_repositories: state.discovered.len(),
        settled: state.is_settled(),
    })
}

pub fn view(
    store: &CoordinationStore,
    registry: &Registry,
    date: ReportDate,
) -> Result<ProgressView, StoreError> {
    Ok(ProgressView {
        date,
        tracker: store.progress(date)?,
        snapshot: snapshot(store, registry, date)?,
        report_ready: store.report_json(date)?.is_some(),
    })
}

impl Pipeline {
    pub fn progress(&self, date: ReportDate) -> Result<ProgressView, StoreError> {
        view(self.store(), self.registry(), date)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use daybook_core::{BranchConvention, RepositoryRef};
    use daybook_store::{MemoryStore, Ttls};

    fn d() -> ReportDate {
        ReportDate::parse("2024-01-05").unwrap()
    }

    fn store() -> CoordinationStore {
        CoordinationStore::new(Arc::new(MemoryStore::new()), Ttls::default())
    }

    fn tracker(total: usize) -> ProgressTracker {
        ProgressTracker {
            total_units: total,
            completed_units: 0,
            started_at: "2024-01-05T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn counters_update_tracker() {
        let store = store();
        store.put_progress(d(), &tracker(2)).unwrap();
        record_completion(&store, d()).unwrap();
        add_units(&store, d(), 3).unwrap();
        add_units(&store, d(), 0).unwrap();
        let t = store.progress(d()).unwrap().unwrap();
        assert_eq!(t.total_units, 5);
        assert_eq!(t.completed_units, 1);
    }

    #[test]
    fn counters_without_tracker_are_noops() {
        let store = store();
        record_completion(&store, d()).unwrap();
        add_units(&store, d(), 2).unwrap();
        assert!(store.progress(d()).unwrap().is_none());
    }

    #[test]
    fn lost_update_does_not_affect_snapshot() {
        let store = store();
        let registry = Registry {
            user: "octocat".into(),
            repositories: vec![RepositoryRef::new("acme/api", &["main", "staging"])],
            convention: BranchConvention::default(),
        };
        store.put_progress(d(), &tracker(2)).unwrap();

        // two handlers read the same tracker, both write completed = 1
        let stale = store.progress(d()).unwrap().unwrap();
        store.put_partial(d(), "acme/api", "main", &[]).unwrap();
        store.put_partial(d(), "acme/api", "staging", &[]).unwrap();
        for _ in 0..2 {
            let mut t = stale.clone();
            t.completed_units += 1;
            store.put_progress(d(), &t).unwrap();
        }

        let v = view(&store, &registry, d()).unwrap();
        assert_eq!(v.tracker.unwrap().completed_units, 1);
        assert_eq!(v.snapshot.completed_units, 2);
        assert_eq!(v.snapshot.expected_units, 2);
        assert!(!v.snapshot.settled);
        assert!(!v.report_ready);
    }
}
