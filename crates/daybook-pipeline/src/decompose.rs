use anyhow::{Context, Result};
use daybook_core::{now_rfc3339, Job, ProgressTracker, ReportDate};
use tracing::info;

use crate::Pipeline;

impl Pipeline {
    /// Seed a wave for `date`: one fetch per repository × base branch, one
    /// discovery per repository, and a single aggregate enqueued last.
    ///
    /// Re-running for the same date clears the previous wave's scratch keys
    /// and starts over. Returns the number of jobs enqueued.
    pub async fn decompose(&self, date: ReportDate) -> Result<usize> {
        let store = self.store();
        let repos = &self.registry().repositories;

        for repo in repos {
            if let Some(previous) = store.discovery(date, &repo.name)? {
                for branch in &previous.branches {
                    store.delete_partial(date, &repo.name, branch)?;
                }
                store.delete_discovery(date, &repo.name)?;
            }
            for base in &repo.base_branches {
                store.delete_partial(date, &repo.name, base)?;
            }
        }

        let tracker = ProgressTracker {
            total_units: self.registry().base_unit_count(),
            completed_units: 0,
            started_at: now_rfc3339(),
        };
        store.put_progress(date, &tracker)?;

        let mut jobs = Vec::new();
        for repo in repos {
            for base in &repo.base_branches {
                jobs.push(Job::fetch(&repo.name, base, date));
            }
        }
        for repo in repos {
            jobs.push(Job::discover(&repo.name, date));
        }
        jobs.push(Job::aggregate(date));

        for job in &jobs {
            self.queue()
                .send(job)
                .await
                .with_context(|| format!("enqueueing {job}"))?;
        }

        info!(
            %date,
            jobs = jobs.len(),
            units = tracker.total_units,
            "decomposed"
        );
        Ok(jobs.len())
    }
}
