//! Config loading and collaborator wiring shared by the subcommands.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use daybook_core::{Config, ReportDate};
use daybook_pipeline::Pipeline;
use daybook_queue::{JobQueue, MemoryQueue, RetryPolicy, SqliteQueue};
use daybook_source::GitHubClient;
use daybook_store::sqlite::{REPORTS_NAMESPACE, SUMMARIES_NAMESPACE};
use daybook_store::{
    default_db_path, CoordinationStore, KvStore, MemoryStore, SqliteStore, SummaryStore, Ttls,
};
use daybook_summary::OpenAiSummarizer;
use tokio_util::sync::CancellationToken;
use tracing::info;

const DEFAULT_CONFIG: &str = "daybook.yaml";

/// `--config`, then `$DAYBOOK_CONFIG`, then `./daybook.yaml`.
pub fn config_path(flag: Option<PathBuf>, lookup: impl Fn(&str) -> Option<String>) -> PathBuf {
    flag.or_else(|| {
        lookup("DAYBOOK_CONFIG")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from)
    })
    .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
}

pub fn load_config(path: &Path) -> Result<Config> {
    Config::load(path).with_context(|| format!("loading config from {}", path.display()))
}

/// Parse `--date`, defaulting to today in the schedule's offset.
pub fn resolve_date(config: &Config, raw: Option<&str>) -> Result<ReportDate> {
    match raw {
        Some(raw) => Ok(ReportDate::parse(raw)?),
        None => Ok(ReportDate::today_in(config.schedule.offset()?)),
    }
}

pub fn db_path(config: &Config) -> PathBuf {
    config.store.path.clone().unwrap_or_else(default_db_path)
}

/// Stores and queue backed by the shared SQLite file.
pub struct Durable {
    pub reports: Arc<SqliteStore>,
    pub summaries: SummaryStore,
    pub queue: Arc<SqliteQueue>,
}

impl Durable {
    pub fn open(config: &Config) -> Result<Self> {
        let path = db_path(config);
        let ttls = Ttls::from_config(&config.store);
        let reports = Arc::new(
            SqliteStore::open(&path, REPORTS_NAMESPACE)
                .with_context(|| format!("opening store at {}", path.display()))?,
        );
        let summaries = SummaryStore::new(
            Arc::new(SqliteStore::open(&path, SUMMARIES_NAMESPACE)?),
            ttls.report,
        );
        let queue = Arc::new(
            SqliteQueue::open(&path, RetryPolicy::from_config(&config.queue))
                .with_context(|| format!("opening queue at {}", path.display()))?,
        );
        info!(db = %path.display(), "opened shared store");
        Ok(Self {
            reports,
            summaries,
            queue,
        })
    }

    pub fn coordination(&self, config: &Config) -> CoordinationStore {
        CoordinationStore::new(self.reports.clone(), Ttls::from_config(&config.store))
    }

    pub fn pipeline(&self, config: &Config) -> Pipeline {
        build_pipeline(
            config,
            self.coordination(config),
            self.summaries.clone(),
            self.queue.clone(),
        )
    }
}

/// Pipeline over process-local state, for `daybook run`.
pub fn memory_pipeline(config: &Config) -> Pipeline {
    let ttls = Ttls::from_config(&config.store);
    let kv: Arc<dyn KvStore> = Arc::new(MemoryStore::new());
    let store = CoordinationStore::new(kv, ttls);
    let summaries = SummaryStore::new(Arc::new(MemoryStore::new()), ttls.report);
    let queue = Arc::new(MemoryQueue::new(RetryPolicy::from_config(&config.queue)));
    build_pipeline(config, store, summaries, queue)
}

fn build_pipeline(
    config: &Config,
    store: CoordinationStore,
    summaries: SummaryStore,
    queue: Arc<dyn JobQueue>,
) -> Pipeline {
    let source = Arc::new(GitHubClient::from_config(config));
    let mut pipeline = Pipeline::new(config.registry.clone(), source, store, queue)
        .with_timings(config.pipeline.clone());
    let api_key = config
        .secrets
        .openai_api_key
        .as_ref()
        .filter(|_| config.summaries_enabled());
    if let Some(key) = api_key {
        let summarizer = OpenAiSummarizer::new(
            &config.summary,
            key.clone(),
            config.registry.repositories.clone(),
        );
        pipeline = pipeline.with_summaries(summaries, Arc::new(summarizer));
    }
    pipeline
}

pub fn ctrlc_cancel(cancel: CancellationToken) {
    let _ = ctrlc::set_handler(move || {
        cancel.cancel();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "
user: octocat
repositories:
  - acme/api
schedule:
  daily_at: \"23:55\"
  utc_offset: \"+08:00\"
";

    #[test]
    fn config_flag_wins() {
        let path = config_path(Some(PathBuf::from("a.yaml")), |_| Some("b.yaml".into()));
        assert_eq!(path, PathBuf::from("a.yaml"));
    }

    #[test]
    fn config_env_then_default() {
        let path = config_path(None, |k| (k == "DAYBOOK_CONFIG").then(|| "b.yaml".into()));
        assert_eq!(path, PathBuf::from("b.yaml"));
        assert_eq!(config_path(None, |_| Some("  ".into())), PathBuf::from(DEFAULT_CONFIG));
        assert_eq!(config_path(None, |_| None), PathBuf::from(DEFAULT_CONFIG));
    }

    #[test]
    fn explicit_date_is_validated() {
        let config = Config::parse(SAMPLE).unwrap();
        assert_eq!(
            resolve_date(&config, Some("2024-01-05")).unwrap().to_string(),
            "2024-01-05"
        );
        assert!(resolve_date(&config, Some("05/01/2024")).is_err());
        assert!(resolve_date(&config, None).is_ok());
    }

    #[test]
    fn durable_handles_share_one_file() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = Config::parse(SAMPLE).unwrap();
        config.store.path = Some(tmp.path().join("nested").join("daybook.db"));

        let durable = Durable::open(&config).unwrap();
        let date = ReportDate::parse("2024-01-05").unwrap();
        durable.summaries.put(date, "Date: 2024-01-05\n\nNONE").unwrap();
        durable
            .coordination(&config)
            .put_partial(date, "acme/api", "main", &[])
            .unwrap();

        let reopened = Durable::open(&config).unwrap();
        assert!(reopened.summaries.get(date).unwrap().is_some());
        assert!(reopened
            .coordination(&config)
            .has_partial(date, "acme/api", "main")
            .unwrap());
    }

    #[test]
    fn bundled_sample_config_is_valid() {
        let config = Config::parse(include_str!("../../../daybook.yaml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.registry.base_unit_count(), 3);
        assert!(config.schedule.trigger().unwrap().is_some());
    }

    #[test]
    fn summaries_stay_off_without_a_key() {
        let config = Config::parse(SAMPLE).unwrap();
        let pipeline = memory_pipeline(&config);
        assert!(pipeline.summary_store().is_none());
    }
}
