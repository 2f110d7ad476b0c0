//! Durable queue in a SQLite file.
//!
//! Shares the store's database file so a server and any number of worker
//! processes cooperate through it. Leases are expressed as `visible_at`: a
//! received message is pushed `visibility_timeout` into the future and becomes
//! receivable again if nobody acknowledges it.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use daybook_core::Job;
use rusqlite::{params, Connection, TransactionBehavior};

use crate::{DeadLetter, Delivery, JobQueue, QueueError, RetryOutcome, RetryPolicy};

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS jobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    body TEXT NOT NULL,
    attempts INTEGER NOT NULL DEFAULT 0,
    visible_at INTEGER NOT NULL,
    dead INTEGER NOT NULL DEFAULT 0,
    enqueued_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_jobs_ready ON jobs(dead, visible_at);
";

pub struct SqliteQueue {
    conn: Mutex<Connection>,
    policy: RetryPolicy,
}

impl SqliteQueue {
    pub fn open(db_path: &Path, policy: RetryPolicy) -> Result<Self, QueueError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }
        Self::init(Connection::open(db_path)?, policy)
    }

    pub fn open_in_memory(policy: RetryPolicy) -> Result<Self, QueueError> {
        Self::init(Connection::open_in_memory()?, policy)
    }

    fn init(conn: Connection, policy: RetryPolicy) -> Result<Self, QueueError> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Mutex::new(conn),
            policy,
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, QueueError> {
        self.conn.lock().map_err(|_| QueueError::Poisoned)
    }
}

#[async_trait::async_trait]
impl JobQueue for SqliteQueue {
    async fn send_delayed(&self, job: &Job, delay: Duration) -> Result<(), QueueError> {
        let body = serde_json::to_string(job)?;
        let now = now_millis();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO jobs (body, attempts, visible_at, dead, enqueued_at) VALUES (?1, 0, ?2, 0, ?3)",
            params![body, now + delay.as_millis() as i64, now],
        )?;
        Ok(())
    }

    async fn receive(&self, max: usize) -> Result<Vec<Delivery>, QueueError> {
        let now = now_millis();
        let lease = self.policy.visibility_timeout.as_millis() as i64;
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let rows: Vec<(i64, String, u32)> = {
            let mut stmt = tx.prepare(
                "SELECT id, body, attempts FROM jobs
                 WHERE dead = 0 AND visible_at <= ?1
                 ORDER BY visible_at, id
                 LIMIT ?2",
            )?;
            let rows = stmt
                .query_map(params![now, max as i64], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        let mut out = Vec::with_capacity(rows.len());
        for (id, body, attempts) in rows {
            if attempts >= self.policy.max_attempts {
                tracing::warn!(id, attempts, "lease expired on spent message, dead-lettering");
                tx.execute("UPDATE jobs SET dead = 1 WHERE id = ?1", params![id])?;
                continue;
            }
            let job: Job = match serde_json::from_str(&body) {
                Ok(job) => job,
                Err(e) => {
                    tracing::error!(id, error = %e, "undecodable job body, dead-lettering");
                    tx.execute("UPDATE jobs SET dead = 1 WHERE id = ?1", params![id])?;
                    continue;
                }
            };
            let attempt = attempts + 1;
            tx.execute(
                "UPDATE jobs SET attempts = ?1, visible_at = ?2 WHERE id = ?3",
                params![attempt, now + lease, id],
            )?;
            out.push(Delivery {
                id: id as u64,
                job,
                attempt,
            });
        }
        tx.commit()?;
        Ok(out)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM jobs WHERE id = ?1", params![delivery.id as i64])?;
        Ok(())
    }

    async fn retry(&self, delivery: &Delivery) -> Result<RetryOutcome, QueueError> {
        let conn = self.lock()?;
        if delivery.attempt >= self.policy.max_attempts {
            conn.execute(
                "UPDATE jobs SET dead = 1 WHERE id = ?1",
                params![delivery.id as i64],
            )?;
            return Ok(RetryOutcome::DeadLettered);
        }
        let visible_at = now_millis() + self.policy.retry_delay.as_millis() as i64;
        conn.execute(
            "UPDATE jobs SET visible_at = ?1 WHERE id = ?2 AND dead = 0",
            params![visible_at, delivery.id as i64],
        )?;
        Ok(RetryOutcome::Requeued)
    }

    async fn pending(&self) -> Result<usize, QueueError> {
        let conn = self.lock()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM jobs WHERE dead = 0", [], |row| {
            row.get(0)
        })?;
        Ok(n as usize)
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>, QueueError> {
        let conn = self.lock()?;
        let mut stmt =
            conn.prepare("SELECT id, body, attempts FROM jobs WHERE dead = 1 ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u32>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let dead = rows
            .into_iter()
            .filter_map(|(id, body, attempts)| {
                serde_json::from_str(&body).ok().map(|job| DeadLetter {
                    id: id as u64,
                    job,
                    attempts,
                })
            })
            .collect();
        Ok(dead)
    }
}

fn now_millis() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use daybook_core::ReportDate;

    fn d() -> ReportDate {
        ReportDate::parse("2024-01-05").unwrap()
    }

    fn policy(max_attempts: u32, retry_delay: Duration) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            retry_delay,
            visibility_timeout: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn send_receive_ack() {
        let q = SqliteQueue::open_in_memory(policy(3, Duration::ZERO)).unwrap();
        q.send(&Job::fetch("acme/api", "main", d())).await.unwrap();
        q.send(&Job::aggregate(d())).await.unwrap();
        assert_eq!(q.pending().await.unwrap(), 2);

        let batch = q.receive(10).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].job, Job::fetch("acme/api", "main", d()));
        assert_eq!(batch[0].attempt, 1);
        assert!(q.receive(10).await.unwrap().is_empty());

        for delivery in &batch {
            q.ack(delivery).await.unwrap();
        }
        assert_eq!(q.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delayed_send_is_invisible() {
        let q = SqliteQueue::open_in_memory(policy(3, Duration::ZERO)).unwrap();
        q.send_delayed(&Job::aggregate(d()), Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(q.receive(10).await.unwrap().is_empty());
        assert_eq!(q.pending().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn retry_requeues_then_dead_letters() {
        let q = SqliteQueue::open_in_memory(policy(2, Duration::ZERO)).unwrap();
        q.send(&Job::discover("acme/api", d())).await.unwrap();

        let first = q.receive(1).await.unwrap().remove(0);
        assert_eq!(q.retry(&first).await.unwrap(), RetryOutcome::Requeued);

        let second = q.receive(1).await.unwrap().remove(0);
        assert_eq!(second.attempt, 2);
        assert_eq!(q.retry(&second).await.unwrap(), RetryOutcome::DeadLettered);

        assert_eq!(q.pending().await.unwrap(), 0);
        let dead = q.dead_letters().await.unwrap();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].job, Job::discover("acme/api", d()));
    }

    #[tokio::test]
    async fn two_handles_share_a_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("daybook.db");
        let producer = SqliteQueue::open(&path, policy(3, Duration::ZERO)).unwrap();
        let consumer = SqliteQueue::open(&path, policy(3, Duration::ZERO)).unwrap();

        producer.send(&Job::aggregate(d())).await.unwrap();
        let got = consumer.receive(5).await.unwrap();
        assert_eq!(got.len(), 1);
        // leased by the consumer, so the producer's handle sees nothing
        assert!(producer.receive(5).await.unwrap().is_empty());
        consumer.ack(&got[0]).await.unwrap();
        assert_eq!(producer.pending().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn undecodable_body_is_dead_lettered() {
        let q = SqliteQueue::open_in_memory(policy(3, Duration::ZERO)).unwrap();
        {
            let conn = q.lock().unwrap();
            conn.execute(
                "INSERT INTO jobs (body, attempts, visible_at, dead, enqueued_at) VALUES ('{\"type\":\"nope\"}', 0, 0, 0, 0)",
                [],
            )
            .unwrap();
        }
        assert!(q.receive(5).await.unwrap().is_empty());
        assert_eq!(q.pending().await.unwrap(), 0);
    }
}
