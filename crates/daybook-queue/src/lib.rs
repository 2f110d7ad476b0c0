//! Job queue transports.
//!
//! Delivery is at-least-once: a received message is leased for a visibility
//! timeout and comes back if it is neither acknowledged nor retried in time.
//! Handlers must therefore tolerate duplicate and re-ordered execution.

pub mod memory;
pub mod sqlite;

use std::time::Duration;

use daybook_core::config::QueueConfig;
use daybook_core::Job;

pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("encoding job: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("queue lock poisoned")]
    Poisoned,
}

/// A message handed to a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: u64,
    pub job: Job,
    /// 1 on first delivery.
    pub attempt: u32,
}

/// A message that exhausted its delivery budget.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub id: u64,
    pub job: Job,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    Requeued,
    DeadLettered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub retry_delay: Duration,
    pub visibility_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&QueueConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &QueueConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts.max(1),
            retry_delay: cfg.retry_delay(),
            visibility_timeout: cfg.visibility_timeout(),
        }
    }
}

#[async_trait::async_trait]
pub trait JobQueue: Send + Sync {
    async fn send(&self, job: &Job) -> Result<(), QueueError> {
        self.send_delayed(job, Duration::ZERO).await
    }

    /// Enqueue a job that becomes visible after `delay`.
    async fn send_delayed(&self, job: &Job, delay: Duration) -> Result<(), QueueError>;

    /// Lease up to `max` visible messages.
    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError>;

    /// Acknowledge a delivery. Acknowledging an unknown id is a no-op.
    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Return a failed delivery to the queue, or dead-letter it once the
    /// attempt budget is spent.
    async fn retry(&self, delivery: &Delivery) -> Result<RetryOutcome, QueueError>;

    /// Messages not yet acknowledged or dead-lettered (visible, delayed or leased).
    async fn pending(&self) -> Result<usize, QueueError>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, QueueError>;
}
