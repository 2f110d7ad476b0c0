use anyhow::{Context, Result};
use daybook_core::{now_rfc3339, DiscoveryRecord, Job, ReportDate};
use tracing::{info, warn};

use crate::{progress, HandleOutcome, Pipeline};

/// Fan out fetch jobs for the repository's unmerged feature branches.
///
/// The discovery record is written after the fetch jobs are enqueued; the
/// aggregate barrier relies on that order.
pub async fn handle(pipeline: &Pipeline, repo: &str, date: ReportDate) -> Result<HandleOutcome> {
    let Some(repo_ref) = pipeline.registry.repository(repo) else {
        warn!(%date, repo, "discovery for unregistered repository, skipping");
        return Ok(HandleOutcome::Skipped);
    };
    let bases = &repo_ref.base_branches;

    let branches = pipeline
        .source
        .list_branches(repo)
        .await
        .with_context(|| format!("listing branches of {repo}"))?;
    let candidates: Vec<String> = branches
        .into_iter()
        .map(|b| b.name)
        .filter(|name| pipeline.registry.convention.is_feature_branch(name, bases))
        .collect();

    let mut unmerged = Vec::new();
    for branch in &candidates {
        if !pipeline.source.is_merged(repo, branch, bases).await {
            unmerged.push(branch.clone());
        }
    }

    for branch in &unmerged {
        pipeline
            .queue
            .send(&Job::fetch(repo, branch, date))
            .await
            .with_context(|| format!("enqueueing fetch for {repo}/{branch}"))?;
    }

    let first_record = pipeline.store.discovery(date, repo)?.is_none();
    pipeline.store.put_discovery(
        date,
        repo,
        &DiscoveryRecord {
            branches: unmerged.clone(),
            discovered_at: now_rfc3339(),
        },
    )?;
    if first_record {
        progress::add_units(&pipeline.store, date, unmerged.len())?;
    }

    info!(
        %date,
        repo,
        feature_branches = candidates.len(),
        unmerged = unmerged.len(),
        "discovered feature branches"
    );
    Ok(HandleOutcome::Done)
}
