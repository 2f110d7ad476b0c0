use anyhow::{Context, Result};
use daybook_core::{now_rfc3339, BranchName, CommitRecord, RepositoryRef, ReportDate};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::barrier::{self, BarrierState, Unit};
use crate::report::build_report;
use crate::{HandleOutcome, Pipeline};

/// Gather every partial result for the date into the final report.
///
/// Defers while the barrier is unsettled and the settle timeout has not run
/// out. Partial keys are deleted only after the report is saved, so a failed
/// attempt can be redelivered without losing data. An aggregate that loses a
/// race with another one for the same date never overwrites its report.
pub async fn handle(pipeline: &Pipeline, date: ReportDate) -> Result<HandleOutcome> {
    let store = &pipeline.store;
    let tracker = store.progress(date)?;
    if tracker.is_none() && store.report_json(date)?.is_some() {
        info!(%date, "report already finalized, skipping duplicate aggregate");
        return Ok(HandleOutcome::Skipped);
    }

    let state = barrier::inspect(store, &pipeline.registry, date)?;
    if !state.is_settled() {
        let timeout = pipeline.timings.settle_timeout();
        let expired = match &tracker {
            Some(t) => barrier::deadline_passed(&t.started_at, timeout, OffsetDateTime::now_utc()),
            None => true,
        };
        if !expired {
            debug!(
                %date,
                missing = state.missing.len(),
                undiscovered = state.undiscovered.len(),
                "aggregate not settled, deferring"
            );
            return Ok(HandleOutcome::Deferred(pipeline.timings.poll_interval()));
        }
        log_outstanding(date, &state);
    }

    let mut collected: Vec<CommitRecord> = Vec::new();
    let mut consumed: Vec<Unit> = Vec::new();
    let mut vanished: Vec<Unit> = Vec::new();
    for repo in &pipeline.registry.repositories {
        let mut branches = repo.base_branches.clone();
        branches.extend(feature_branches(pipeline, repo, &state).await);
        for branch in branches {
            let unit = Unit {
                repo: repo.name.clone(),
                branch,
            };
            match store.partial(date, &unit.repo, &unit.branch)? {
                Some(commits) => collected.extend(commits),
                None if was_present(&state, &unit) => vanished.push(unit.clone()),
                None => {}
            }
            consumed.push(unit);
        }
    }

    // A partial that disappeared, or a tracker that did, means another
    // aggregate finalized this date while we were collecting.
    let tracker_gone = tracker.is_some() && store.progress(date)?.is_none();
    if !vanished.is_empty() || tracker_gone {
        if store.report_json(date)?.is_some() {
            info!(
                %date,
                vanished = vanished.len(),
                "report finalized by a concurrent aggregate, skipping"
            );
            return Ok(HandleOutcome::Skipped);
        }
        warn!(
            %date,
            vanished = vanished.len(),
            "partial results disappeared before a report was saved, re-checking later"
        );
        return Ok(HandleOutcome::Deferred(pipeline.timings.poll_interval()));
    }

    let report = build_report(date, collected, now_rfc3339());
    store
        .put_report(&report)
        .with_context(|| format!("saving report for {date}"))?;

    for unit in &consumed {
        store.delete_partial(date, &unit.repo, &unit.branch)?;
    }
    for repo in &pipeline.registry.repositories {
        store.delete_discovery(date, &repo.name)?;
    }
    store.delete_progress(date)?;

    info!(
        %date,
        commits = report.total_commits,
        repositories = report.repositories,
        "aggregated"
    );

    pipeline.summarize(&report).await;
    Ok(HandleOutcome::Done)
}

/// Feature branches to collect for `repo`: the recorded fan-out, or a fresh
/// listing filtered by the convention when discovery never recorded one.
async fn feature_branches(
    pipeline: &Pipeline,
    repo: &RepositoryRef,
    state: &BarrierState,
) -> Vec<BranchName> {
    if let Some(recorded) = state.discovered.get(&repo.name) {
        return recorded.clone();
    }
    match pipeline.source.list_branches(&repo.name).await {
        Ok(branches) => branches
            .into_iter()
            .map(|b| b.name)
            .filter(|name| {
                pipeline
                    .registry
                    .convention
                    .is_feature_branch(name, &repo.base_branches)
            })
            .collect(),
        Err(e) => {
            warn!(repo = %repo.name, error = %e, "fallback branch listing failed");
            Vec::new()
        }
    }
}

/// The barrier saw a partial result for `unit`.
fn was_present(state: &BarrierState, unit: &Unit) -> bool {
    state.expected.contains(unit) && !state.missing.contains(unit)
}

fn log_outstanding(date: ReportDate, state: &BarrierState) {
    for unit in &state.missing {
        warn!(%date, unit = %unit, "settle timeout reached without a partial result");
    }
    for repo in &state.undiscovered {
        warn!(%date, repo, "settle timeout reached before discovery ran, feature branches may be missed");
    }
}
