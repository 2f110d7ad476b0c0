//! Scatter/gather pipeline that turns one date into a [`Report`].
//!
//! The decomposer seeds a wave of jobs; handlers communicate only through the
//! coordination store; the aggregate job waits on a completion barrier and
//! then finalizes. Every handler tolerates duplicate and re-ordered delivery.

pub mod barrier;
pub mod decompose;
pub mod handlers;
pub mod progress;
pub mod report;
pub mod scheduler;
pub mod worker;

#[cfg(test)]
mod testkit;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use daybook_core::config::PipelineConfig;
use daybook_core::{Job, Registry, Report};
use daybook_queue::JobQueue;
use daybook_source::SourceClient;
use daybook_store::{CoordinationStore, SummaryStore};
use daybook_summary::Summarizer;

pub use progress::{ProgressSnapshot, ProgressView};
pub use worker::{BatchStats, Worker};

/// What a handler did with a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    Done,
    /// Not ready yet. The job is re-enqueued to run after the delay.
    Deferred(Duration),
    /// Nothing to do, e.g. a duplicate delivery of a finished aggregate.
    Skipped,
}

impl HandleOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            HandleOutcome::Done => "done",
            HandleOutcome::Deferred(_) => "deferred",
            HandleOutcome::Skipped => "skipped",
        }
    }
}

impl fmt::Display for HandleOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Summaries {
    store: SummaryStore,
    summarizer: Arc<dyn Summarizer>,
}

/// Everything a handler needs, injected once and shared by workers, the HTTP
/// surface and the scheduler.
pub struct Pipeline {
    registry: Registry,
    timings: PipelineConfig,
    source: Arc<dyn SourceClient>,
    store: CoordinationStore,
    queue: Arc<dyn JobQueue>,
    summaries: Option<Summaries>,
}

impl Pipeline {
    pub fn new(
        registry: Registry,
        source: Arc<dyn SourceClient>,
        store: CoordinationStore,
        queue: Arc<dyn JobQueue>,
    ) -> Self {
        Self {
            registry,
            timings: PipelineConfig::default(),
            source,
            store,
            queue,
            summaries: None,
        }
    }

    pub fn with_timings(mut self, timings: PipelineConfig) -> Self {
        self.timings = timings;
        self
    }

    pub fn with_summaries(mut self, store: SummaryStore, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summaries = Some(Summaries { store, summarizer });
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn timings(&self) -> &PipelineConfig {
        &self.timings
    }

    pub fn store(&self) -> &CoordinationStore {
        &self.store
    }

    pub fn queue(&self) -> &Arc<dyn JobQueue> {
        &self.queue
    }

    pub fn summary_store(&self) -> Option<&SummaryStore> {
        self.summaries.as_ref().map(|s| &s.store)
    }

    /// Run the handler for `job`.
    pub async fn handle(&self, job: &Job) -> Result<HandleOutcome> {
        match job {
            Job::FetchBranch { repo, branch, date } => {
                handlers::fetch::handle(self, repo, branch, *date).await
            }
            Job::DiscoverFeatureBranches { repo, date } => {
                handlers::discover::handle(self, repo, *date).await
            }
            Job::Aggregate { date } => handlers::aggregate::handle(self, *date).await,
        }
    }

    /// Run `job` and re-enqueue it when the handler defers.
    pub async fn process(&self, job: &Job) -> Result<HandleOutcome> {
        let outcome = self.handle(job).await?;
        if let HandleOutcome::Deferred(delay) = outcome {
            self.queue
                .send_delayed(job, delay)
                .await
                .with_context(|| format!("re-enqueueing deferred {job}"))?;
        }
        Ok(outcome)
    }

    /// Summarize a finished report. Failures are logged and swallowed.
    async fn summarize(&self, report: &Report) {
        let Some(summaries) = &self.summaries else {
            return;
        };
        match summaries.summarizer.summarize(report).await {
            Ok(text) => {
                if let Err(e) = summaries.store.put(report.date, &text) {
                    tracing::error!(date = %report.date, error = %e, "failed to save summary");
                }
            }
            Err(e) => {
                tracing::error!(date = %report.date, error = %e, "summary generation failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_labels() {
        assert_eq!(HandleOutcome::Done.to_string(), "done");
        assert_eq!(HandleOutcome::Deferred(Duration::from_secs(5)).as_str(), "deferred");
        assert_eq!(HandleOutcome::Skipped.as_str(), "skipped");
    }
}
