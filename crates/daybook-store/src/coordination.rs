//! Typed access to the coordination store.
//!
//! Undecodable payloads are logged and read as absent: a corrupt unit is
//! "no data for this unit", never a pipeline failure.

use std::sync::Arc;
use std::time::Duration;

use daybook_core::config::StoreConfig;
use daybook_core::keys;
use daybook_core::summary_text;
use daybook_core::{CommitRecord, DiscoveryRecord, ProgressTracker, Report, ReportDate};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{KvStore, StoreError};

/// Expiry applied to each kind of key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttls {
    pub partial: Duration,
    pub progress: Duration,
    pub report: Duration,
}

impl Default for Ttls {
    fn default() -> Self {
        Self::from_config(&StoreConfig::default())
    }
}

impl Ttls {
    pub fn from_config(cfg: &StoreConfig) -> Self {
        Self {
            partial: cfg.temp_ttl(),
            progress: cfg.progress_ttl(),
            report: cfg.report_ttl(),
        }
    }
}

#[derive(Clone)]
pub struct CoordinationStore {
    kv: Arc<dyn KvStore>,
    ttls: Ttls,
}

impl CoordinationStore {
    pub fn new(kv: Arc<dyn KvStore>, ttls: Ttls) -> Self {
        Self { kv, ttls }
    }

    fn read_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.kv.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Ok(Some(v)),
            Err(e) => {
                tracing::warn!(key, error = %e, "undecodable payload, treating as absent");
                Ok(None)
            }
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), StoreError> {
        let data = serde_json::to_string(value)?;
        self.kv.put(key, &data, Some(ttl))
    }

    // ── Partial results ──

    pub fn put_partial(
        &self,
        date: ReportDate,
        repo: &str,
        branch: &str,
        commits: &[CommitRecord],
    ) -> Result<(), StoreError> {
        let key = keys::temp_key(date, repo, branch);
        self.write_json(&key, &commits, self.ttls.partial)
    }

    pub fn partial(
        &self,
        date: ReportDate,
        repo: &str,
        branch: &str,
    ) -> Result<Option<Vec<CommitRecord>>, StoreError> {
        self.read_json(&keys::temp_key(date, repo, branch))
    }

    pub fn has_partial(&self, date: ReportDate, repo: &str, branch: &str) -> Result<bool, StoreError> {
        self.kv.contains(&keys::temp_key(date, repo, branch))
    }

    pub fn delete_partial(&self, date: ReportDate, repo: &str, branch: &str) -> Result<(), StoreError> {
        self.kv.delete(&keys::temp_key(date, repo, branch))
    }

    // ── Progress ──

    pub fn progress(&self, date: ReportDate) -> Result<Option<ProgressTracker>, StoreError> {
        self.read_json(&keys::progress_key(date))
    }

    pub fn put_progress(&self, date: ReportDate, tracker: &ProgressTracker) -> Result<(), StoreError> {
        self.write_json(&keys::progress_key(date), tracker, self.ttls.progress)
    }

    pub fn delete_progress(&self, date: ReportDate) -> Result<(), StoreError> {
        self.kv.delete(&keys::progress_key(date))
    }

    // ── Discovery records ──

    pub fn discovery(&self, date: ReportDate, repo: &str) -> Result<Option<DiscoveryRecord>, StoreError> {
        self.read_json(&keys::discovery_key(date, repo))
    }

    pub fn put_discovery(
        &self,
        date: ReportDate,
        repo: &str,
        record: &DiscoveryRecord,
    ) -> Result<(), StoreError> {
        self.write_json(&keys::discovery_key(date, repo), record, self.ttls.progress)
    }

    pub fn delete_discovery(&self, date: ReportDate, repo: &str) -> Result<(), StoreError> {
        self.kv.delete(&keys::discovery_key(date, repo))
    }

    // ── Reports ──

    pub fn report(&self, date: ReportDate) -> Result<Option<Report>, StoreError> {
        self.read_json(&keys::report_key(date))
    }

    /// Raw report JSON as stored, for pass-through reads.
    pub fn report_json(&self, date: ReportDate) -> Result<Option<String>, StoreError> {
        self.kv.get(&keys::report_key(date))
    }

    /// Persist a report, overwriting any previous one for the date.
    pub fn put_report(&self, report: &Report) -> Result<(), StoreError> {
        let key = keys::report_key(report.date);
        let data = serde_json::to_string(report)?;
        guard_report_payload(&key, &data)?;
        self.kv.put(&key, &data, Some(self.ttls.report))?;
        tracing::info!(key = %key, commits = report.total_commits, "report saved");
        Ok(())
    }
}

/// A report payload must be a JSON object carrying `totalCommits` and must not
/// carry the summary text layout.
pub fn guard_report_payload(key: &str, payload: &str) -> Result<(), StoreError> {
    let refuse = |reason: &str| StoreError::FormatGuard {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if summary_text::looks_like_summary(payload) {
        return Err(refuse("payload looks like a summary, not a report"));
    }
    let value: serde_json::Value =
        serde_json::from_str(payload).map_err(|_| refuse("payload is not JSON"))?;
    match value.as_object() {
        Some(obj) if obj.contains_key("totalCommits") => Ok(()),
        Some(_) => Err(refuse("payload has no totalCommits")),
        None => Err(refuse("payload is not a JSON object")),
    }
}

/// Human-readable summaries, kept in a namespace disjoint from reports.
#[derive(Clone)]
pub struct SummaryStore {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
}

impl SummaryStore {
    pub fn new(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self { kv, ttl }
    }

    pub fn get(&self, date: ReportDate) -> Result<Option<String>, StoreError> {
        self.kv.get(&keys::summary_key(date))
    }

    /// Persist summary text. Text that parses as a JSON object is refused.
    pub fn put(&self, date: ReportDate, text: &str) -> Result<(), StoreError> {
        let key = keys::summary_key(date);
        let parsed: Result<serde_json::Value, _> = serde_json::from_str(text);
        if matches!(parsed, Ok(serde_json::Value::Object(_))) {
            return Err(StoreError::FormatGuard {
                key,
                reason: "payload is a JSON object, not summary text".into(),
            });
        }
        self.kv.put(&key, text, Some(self.ttl))?;
        tracing::info!(key = %key, "summary saved");
        Ok(())
    }
}
