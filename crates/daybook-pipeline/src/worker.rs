//! Queue consumer.
//!
//! Each received batch runs concurrently. A job is acknowledged once its
//! handler returns `Ok` (deferred jobs have already been re-enqueued by then);
//! a failed job goes back through the queue's retry budget.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use daybook_core::config::QueueConfig;
use daybook_queue::{Delivery, RetryOutcome};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{HandleOutcome, Pipeline};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub received: usize,
    pub done: usize,
    pub deferred: usize,
    pub skipped: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

impl BatchStats {
    fn merge(&mut self, other: BatchStats) {
        self.received += other.received;
        self.done += other.done;
        self.deferred += other.deferred;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self.dead_lettered += other.dead_lettered;
    }
}

enum Settled {
    Outcome(HandleOutcome),
    Failed(RetryOutcome),
}

pub struct Worker {
    pipeline: Arc<Pipeline>,
    batch_size: usize,
    idle_poll: Duration,
}

impl Worker {
    pub fn new(pipeline: Arc<Pipeline>, cfg: &QueueConfig) -> Self {
        Self {
            pipeline,
            batch_size: cfg.batch_size.max(1),
            idle_poll: cfg.idle_poll(),
        }
    }

    /// Receive one batch and run it to completion.
    pub async fn process_batch(&self) -> Result<BatchStats> {
        let deliveries = self.pipeline.queue().receive(self.batch_size).await?;
        let mut stats = BatchStats {
            received: deliveries.len(),
            ..BatchStats::default()
        };

        let mut tasks = JoinSet::new();
        for delivery in deliveries {
            let pipeline = Arc::clone(&self.pipeline);
            tasks.spawn(async move { settle(&pipeline, delivery).await });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(Settled::Outcome(HandleOutcome::Done))) => stats.done += 1,
                Ok(Ok(Settled::Outcome(HandleOutcome::Deferred(_)))) => stats.deferred += 1,
                Ok(Ok(Settled::Outcome(HandleOutcome::Skipped))) => stats.skipped += 1,
                Ok(Ok(Settled::Failed(RetryOutcome::Requeued))) => stats.failed += 1,
                Ok(Ok(Settled::Failed(RetryOutcome::DeadLettered))) => {
                    stats.failed += 1;
                    stats.dead_lettered += 1;
                }
                Ok(Err(e)) => {
                    // queue bookkeeping failed; the lease will expire and redeliver
                    error!(error = %format!("{e:#}"), "queue bookkeeping failed");
                    stats.failed += 1;
                }
                Err(e) => {
                    error!(error = %e, "job task panicked");
                    stats.failed += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Process until the queue holds nothing, including delayed messages.
    pub async fn drain(&self) -> Result<BatchStats> {
        let mut total = BatchStats::default();
        loop {
            let stats = self.process_batch().await?;
            total.merge(stats);
            if stats.received == 0 {
                if self.pipeline.queue().pending().await? == 0 {
                    break;
                }
                tokio::time::sleep(self.idle_poll).await;
            }
        }
        Ok(total)
    }

    /// Process until cancelled. Cancellation is checked between batches.
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        info!(batch_size = self.batch_size, "worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let stats = match self.process_batch().await {
                Ok(stats) => stats,
                Err(e) => {
                    error!(error = %format!("{e:#}"), "receiving batch failed");
                    BatchStats::default()
                }
            };
            if stats.received > 0 {
                debug!(?stats, "batch processed");
                continue;
            }
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.idle_poll) => {}
            }
        }
        info!("worker stopped");
        Ok(())
    }
}

async fn settle(pipeline: &Pipeline, delivery: Delivery) -> Result<Settled> {
    let queue = pipeline.queue();
    match pipeline.process(&delivery.job).await {
        Ok(outcome) => {
            queue.ack(&delivery).await?;
            Ok(Settled::Outcome(outcome))
        }
        Err(e) => {
            warn!(
                job = %delivery.job,
                attempt = delivery.attempt,
                error = %format!("{e:#}"),
                "job failed"
            );
            let retry = queue.retry(&delivery).await?;
            if retry == RetryOutcome::DeadLettered {
                error!(job = %delivery.job, attempts = delivery.attempt, "job dead-lettered");
            }
            Ok(Settled::Failed(retry))
        }
    }
}
