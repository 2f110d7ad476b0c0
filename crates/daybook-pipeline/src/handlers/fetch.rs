use anyhow::{Context, Result};
use daybook_core::ReportDate;
use tracing::info;

use crate::{progress, HandleOutcome, Pipeline};

/// List the user's commits on one branch and store them as that unit's
/// partial result. Overwrites on redelivery.
pub async fn handle(
    pipeline: &Pipeline,
    repo: &str,
    branch: &str,
    date: ReportDate,
) -> Result<HandleOutcome> {
    let commits = pipeline
        .source
        .list_commits(repo, branch, date)
        .await
        .with_context(|| format!("listing commits on {repo}/{branch}"))?;

    pipeline.store.put_partial(date, repo, branch, &commits)?;
    progress::record_completion(&pipeline.store, date)?;

    info!(%date, repo, branch, commits = commits.len(), "fetched branch");
    Ok(HandleOutcome::Done)
}
