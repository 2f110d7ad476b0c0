use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use daybook_core::Job;
use tokio::time::Instant;

use crate::{DeadLetter, Delivery, JobQueue, QueueError, RetryOutcome, RetryPolicy};

struct Message {
    id: u64,
    job: Job,
    attempts: u32,
    visible_at: Instant,
    leased_until: Option<Instant>,
}

impl Message {
    fn is_available(&self, now: Instant) -> bool {
        self.visible_at <= now && self.leased_until.map_or(true, |until| until <= now)
    }
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    messages: VecDeque<Message>,
    dead: Vec<DeadLetter>,
    sent: Vec<Job>,
}

/// In-process queue on the tokio clock, so paused-time tests advance through
/// delays and lease expiry.
pub struct MemoryQueue {
    inner: Mutex<Inner>,
    policy: RetryPolicy,
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl MemoryQueue {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            policy,
        }
    }

    /// Every job ever sent, in send order.
    pub fn sent(&self) -> Vec<Job> {
        self.inner.lock().map(|i| i.sent.clone()).unwrap_or_default()
    }

    /// Jobs currently queued, in queue order.
    pub fn queued(&self) -> Vec<Job> {
        self.inner
            .lock()
            .map(|i| i.messages.iter().map(|m| m.job.clone()).collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl JobQueue for MemoryQueue {
    async fn send_delayed(&self, job: &Job, delay: Duration) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().map_err(|_| QueueError::Poisoned)?;
        inner.next_id += 1;
        let id = inner.next_id;
        inner.messages.push_back(Message {
            id,
            job: job.clone(),
            attempts: 0,
            visible_at: Instant::now() + delay,
            leased_until: None,
        });
        inner.sent.push(job.clone());
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError> {
        let mut inner = self.inner.lock().map_err(|_| QueueError::Poisoned)?;
        let now = Instant::now();
        let max_attempts = self.policy.max_attempts;
        let lease = self.policy.visibility_timeout;

        // Expired leases on spent messages go to the dead-letter list.
        let mut expired = Vec::new();
        inner.messages.retain(|m| {
            let spent = m.leased_until.is_some() && m.is_available(now) && m.attempts >= max_attempts;
            if spent {
                expired.push(DeadLetter {
                    id: m.id,
                    job: m.job.clone(),
                    attempts: m.attempts,
                });
            }
            !spent
        });
        inner.dead.extend(expired);

        let mut out = Vec::new();
        for m in inner.messages.iter_mut() {
            if out.len() >= max {
                break;
            }
            if !m.is_available(now) {
                continue;
            }
            m.attempts += 1;
            m.leased_until = Some(now + lease);
            out.push(Delivery {
                id: m.id,
                job: m.job.clone(),
                attempt: m.attempts,
            });
        }
        Ok(out)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().map_err(|_| QueueError::Poisoned)?;
        inner.messages.retain(|m| m.id != delivery.id);
        Ok(())
    }

    async fn retry(&self, delivery: &Delivery) -> Result<RetryOutcome, QueueError> {
        let mut inner = self.inner.lock().map_err(|_| QueueError::Poisoned)?;
        let Some(pos) = inner.messages.iter().position(|m| m.id == delivery.id) else {
            return Ok(RetryOutcome::Requeued);
        };
        if inner.messages[pos].attempts >= self.policy.max_attempts {
            let removed = inner.messages.remove(pos);
            if let Some(m) = removed {
                inner.dead.push(DeadLetter {
                    id: m.id,
                    job: m.job,
                    attempts: m.attempts,
                });
            }
            return Ok(RetryOutcome::DeadLettered);
        }
        let m = &mut inner.messages[pos];
        m.leased_until = None;
        m.visible_at = Instant::now() + self.policy.retry_delay;
        Ok(RetryOutcome::Requeued)
    }

    async fn pending(&self) -> Result<usize, QueueError> {
        let inner = self.inner.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(inner.messages.len())
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, QueueError> {
        let inner = self.inner.lock().map_err(|_| QueueError::Poisoned)?;
        Ok(inner.dead.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::ReportDate;

    fn d() -> ReportDate {
        ReportDate::parse("2024-01-05").unwrap()
    }

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            retry_delay: Duration::from_secs(10),
            visibility_timeout: Duration::from_secs(60),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fifo_delivery_and_ack() {
        let q = MemoryQueue::new(policy(3));
        q.send(&Job::fetch("a", "main", d())).await.unwrap();
        q.send(&Job::aggregate(d())).await.unwrap();

        let batch = q.receive(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].job.kind(), "fetch_branch");
        assert_eq!(batch[1].job.kind(), "aggregate");
        assert_eq!(batch[0].attempt, 1);

        // leased messages are not handed out twice
        assert!(q.receive(10).await.unwrap().is_empty());

        for d in &batch {
            q.ack(d).await.unwrap();
        }
        assert_eq!(q.pending().await.unwrap(), 0);
        assert_eq!(q.sent().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn receive_respects_max() {
        let q = MemoryQueue::new(policy(3));
        for b in ["a", "b", "c"] {
            q.send(&Job::fetch("r", b, d())).await.unwrap();
        }
        assert_eq!(q.receive(2).await.unwrap().len(), 2);
        assert_eq!(q.receive(2).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn delayed_message_becomes_visible() {
        let q = MemoryQueue::new(policy(3));
        q.send_delayed(&Job::aggregate(d()), Duration::from_secs(5))
            .await
            .unwrap();
        assert!(q.receive(1).await.unwrap().is_empty());
        assert_eq!(q.pending().await.unwrap(), 1);
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(q.receive(1).await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unacked_lease_is_redelivered() {
        let q = MemoryQueue::new(policy(3));
        q.send(&Job::aggregate(d())).await.unwrap();
        let first = q.receive(1).await.unwrap();
        assert_eq!(first[0].attempt, 1);
        tokio::time::advance(Duration::from_secs(61)).await;
        let second = q.receive(1).await.unwrap();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].attempt, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_then_dead_letter() {
        let q = MemoryQueue::new(policy(2));
        q.send(&Job::discover("a", d())).await.unwrap();

        let first = q.receive(1).await.unwrap().remove(0);
        assert_eq!(q.retry(&first).await.unwrap(), RetryOutcome::Requeued);
        assert!(q.receive(1).await.unwrap().is_empty());

        tokio::time::advance(Duration::from_secs(10)).await;
        let second = q.receive(1).await.unwrap().remove(0);
        assert_eq!(second.attempt, 2);
        assert_eq!(q.retry(&second).await.unwrap(), RetryOutcome::DeadLettered);

        assert_eq!(q.pending().await.unwrap(), 0);
        let dead = q.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].attempts, 2);
        assert_eq!(dead[0].job, Job::discover("a", d()));
    }

    #[tokio::test(start_paused = true)]
    async fn spent_lease_expiry_dead_letters() {
        let q = MemoryQueue::new(policy(1));
        q.send(&Job::aggregate(d())).await.unwrap();
        let _lost = q.receive(1).await.unwrap();
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(q.receive(1).await.unwrap().is_empty());
        assert_eq!(q.dead_letters().await.unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn ack_unknown_is_noop() {
        let q = MemoryQueue::new(policy(1));
        let ghost = Delivery {
            id: 99,
            job: Job::aggregate(d()),
            attempt: 1,
        };
        q.ack(&ghost).await.unwrap();
        assert_eq!(q.retry(&ghost).await.unwrap(), RetryOutcome::Requeued);
    }
}
