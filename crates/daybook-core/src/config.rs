//! `daybook.yaml` loading and validation.
//!
//! ```yaml
//! user: octocat
//! base_branches: [main, staging]
//! branch_prefixes: ["feat/", "fix/", "task/"]
//! repositories:
//!   - acme/api
//!   - name: acme/web
//!     description: Public website
//!     base_branches: [main]
//! ```
//!
//! Secrets are read from the environment (`GITHUB_TOKEN`, `GITHUB_USER`,
//! `OPENAI_API_KEY`) and take precedence over the file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use time::macros::format_description;
use time::{Time, UtcOffset};

use crate::branch::BranchConvention;
use crate::types::RepositoryRef;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ── File schema ──

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum RepoEntry {
    Short(String),
    Long(RepositoryRef),
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    user: String,
    #[serde(default = "default_base_branches")]
    base_branches: Vec<String>,
    #[serde(default)]
    branch_prefixes: Option<Vec<String>>,
    repositories: Vec<RepoEntry>,
    #[serde(default)]
    github: GithubConfig,
    #[serde(default)]
    pipeline: PipelineConfig,
    #[serde(default)]
    store: StoreConfig,
    #[serde(default)]
    queue: QueueConfig,
    #[serde(default)]
    summary: SummaryConfig,
    #[serde(default)]
    serve: ServeConfig,
    #[serde(default)]
    schedule: ScheduleConfig,
}

fn default_base_branches() -> Vec<String> {
    vec!["main".into()]
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GithubConfig {
    pub api_base: String,
    /// Delay before each commit-listing and compare call.
    pub pacing_ms: u64,
    /// Commits requested per branch. Only the first page is read.
    pub per_page: u32,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.github.com".into(),
            pacing_ms: 300,
            per_page: 100,
            timeout_secs: 30,
            user_agent: "daybook".into(),
        }
    }
}

impl GithubConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How long an aggregate job waits for outstanding units, measured from decomposition.
    pub settle_timeout_secs: u64,
    /// Delay before an unsettled aggregate job is looked at again.
    pub poll_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            settle_timeout_secs: 600,
            poll_interval_secs: 5,
        }
    }
}

impl PipelineConfig {
    pub fn settle_timeout(&self) -> Duration {
        Duration::from_secs(self.settle_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite file shared by the store and the queue. Defaults to the per-user data dir.
    pub path: Option<PathBuf>,
    pub temp_ttl_secs: u64,
    pub progress_ttl_secs: u64,
    pub report_ttl_days: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: None,
            temp_ttl_secs: 60 * 60,
            progress_ttl_secs: 60 * 60,
            report_ttl_days: 90,
        }
    }
}

impl StoreConfig {
    pub fn temp_ttl(&self) -> Duration {
        Duration::from_secs(self.temp_ttl_secs)
    }

    pub fn progress_ttl(&self) -> Duration {
        Duration::from_secs(self.progress_ttl_secs)
    }

    pub fn report_ttl(&self) -> Duration {
        Duration::from_secs(self.report_ttl_days * 24 * 60 * 60)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Deliveries per message before it is dead-lettered.
    pub max_attempts: u32,
    pub retry_delay_secs: u64,
    pub visibility_timeout_secs: u64,
    pub batch_size: usize,
    pub idle_poll_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_delay_secs: 10,
            visibility_timeout_secs: 300,
            batch_size: 10,
            idle_poll_ms: 1000,
        }
    }
}

impl QueueConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_secs)
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    pub enabled: bool,
    pub api_base: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub max_chars: usize,
    pub timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_base: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.7,
            max_tokens: 500,
            max_chars: 4000,
            timeout_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Wall-clock trigger time, `HH:MM`.
    pub daily_at: Option<String>,
    /// Offset the trigger time and "today" are interpreted in, `+HH:MM`.
    pub utc_offset: Option<String>,
}

/// Parsed trigger time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTrigger {
    pub at: Time,
    pub offset: UtcOffset,
}

impl ScheduleConfig {
    pub fn trigger(&self) -> Result<Option<DailyTrigger>, ConfigError> {
        let Some(at) = self.daily_at.as_deref() else {
            return Ok(None);
        };
        let at = Time::parse(at, format_description!("[hour]:[minute]"))
            .map_err(|_| ConfigError::Invalid(format!("schedule.daily_at `{at}` is not HH:MM")))?;
        Ok(Some(DailyTrigger {
            at,
            offset: self.offset()?,
        }))
    }

    pub fn offset(&self) -> Result<UtcOffset, ConfigError> {
        match self.utc_offset.as_deref() {
            None => Ok(UtcOffset::UTC),
            Some(s) => UtcOffset::parse(
                s,
                format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
            )
            .map_err(|_| ConfigError::Invalid(format!("schedule.utc_offset `{s}` is not +HH:MM"))),
        }
    }
}

/// Secrets and identity taken from the environment.
#[derive(Debug, Clone, Default)]
pub struct Secrets {
    pub github_token: Option<String>,
    pub openai_api_key: Option<String>,
}

// ── Resolved config ──

/// The static set of repositories to report on, plus the tracked user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registry {
    pub user: String,
    pub repositories: Vec<RepositoryRef>,
    pub convention: BranchConvention,
}

impl Registry {
    pub fn repository(&self, name: &str) -> Option<&RepositoryRef> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Number of repository × base-branch units seeded by decomposition.
    pub fn base_unit_count(&self) -> usize {
        self.repositories.iter().map(|r| r.base_branches.len()).sum()
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub registry: Registry,
    pub github: GithubConfig,
    pub pipeline: PipelineConfig,
    pub store: StoreConfig,
    pub queue: QueueConfig,
    pub summary: SummaryConfig,
    pub serve: ServeConfig,
    pub schedule: ScheduleConfig,
    pub secrets: Secrets,
}

impl Config {
    /// Load from a YAML file, then overlay environment secrets.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::parse(&content)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML string without consulting the environment.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        let repositories = raw
            .repositories
            .into_iter()
            .map(|entry| match entry {
                RepoEntry::Short(name) => RepositoryRef {
                    name,
                    description: String::new(),
                    base_branches: raw.base_branches.clone(),
                },
                RepoEntry::Long(mut repo) => {
                    if repo.base_branches.is_empty() {
                        repo.base_branches = raw.base_branches.clone();
                    }
                    repo
                }
            })
            .collect();
        let convention = raw
            .branch_prefixes
            .map(BranchConvention::new)
            .unwrap_or_default();

        let config = Self {
            registry: Registry {
                user: raw.user,
                repositories,
                convention,
            },
            github: raw.github,
            pipeline: raw.pipeline,
            store: raw.store,
            queue: raw.queue,
            summary: raw.summary,
            serve: raw.serve,
            schedule: raw.schedule,
            secrets: Secrets::default(),
        };
        Ok(config)
    }

    /// Overlay secrets and the tracked user from an environment lookup.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(user) = non_empty("GITHUB_USER") {
            self.registry.user = user;
        }
        if let Some(token) = non_empty("GITHUB_TOKEN") {
            self.secrets.github_token = Some(token);
        }
        if let Some(key) = non_empty("OPENAI_API_KEY") {
            self.secrets.openai_api_key = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let reg = &self.registry;
        if reg.user.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "no tracked user (set `user` or GITHUB_USER)".into(),
            ));
        }
        if reg.repositories.is_empty() {
            return Err(ConfigError::Invalid("no repositories configured".into()));
        }
        let mut seen = HashSet::new();
        for repo in &reg.repositories {
            if repo.name.trim().is_empty() {
                return Err(ConfigError::Invalid("repository with empty name".into()));
            }
            if !seen.insert(repo.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate repository `{}`",
                    repo.name
                )));
            }
            if repo.base_branches.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "repository `{}` has no base branches",
                    repo.name
                )));
            }
        }
        if reg.convention.prefixes.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::Invalid("empty branch prefix".into()));
        }
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Invalid("queue.max_attempts must be at least 1".into()));
        }
        self.schedule.trigger()?;
        Ok(())
    }

    /// Summaries are produced only when enabled and an API key is present.
    pub fn summaries_enabled(&self) -> bool {
        self.summary.enabled && self.secrets.openai_api_key.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
user: octocat
base_branches: [main, staging]
repositories:
  - acme/api
  - name: acme/web
    description: Public website
    base_branches: [main]
"#;

    #[test]
    fn parse_short_and_long_repos() {
        let cfg = Config::parse(SAMPLE).unwrap();
        let repos = &cfg.registry.repositories;
        assert_eq!(repos.len(), 2);
        assert_eq!(repos[0].name, "acme/api");
        assert_eq!(repos[0].base_branches, vec!["main", "staging"]);
        assert_eq!(repos[1].description, "Public website");
        assert_eq!(repos[1].base_branches, vec!["main"]);
        assert_eq!(cfg.registry.base_unit_count(), 3);
    }

    #[test]
    fn defaults_applied() {
        let cfg = Config::parse("user: u\nrepositories: [a/b]\n").unwrap();
        assert_eq!(cfg.registry.repositories[0].base_branches, vec!["main"]);
        assert_eq!(cfg.registry.convention, BranchConvention::default());
        assert_eq!(cfg.github.per_page, 100);
        assert_eq!(cfg.github.pacing(), Duration::from_millis(300));
        assert_eq!(cfg.store.temp_ttl(), Duration::from_secs(3600));
        assert_eq!(cfg.store.report_ttl(), Duration::from_secs(90 * 86_400));
        assert_eq!(cfg.queue.max_attempts, 3);
        assert_eq!(cfg.summary.model, "gpt-4o-mini");
        cfg.validate().unwrap();
    }

    #[test]
    fn env_overrides_user_and_secrets() {
        let mut cfg = Config::parse(SAMPLE).unwrap();
        cfg.apply_env(|k| match k {
            "GITHUB_USER" => Some("hubot".into()),
            "GITHUB_TOKEN" => Some("ghp_x".into()),
            "OPENAI_API_KEY" => Some("  ".into()),
            _ => None,
        });
        assert_eq!(cfg.registry.user, "hubot");
        assert_eq!(cfg.secrets.github_token.as_deref(), Some("ghp_x"));
        assert!(cfg.secrets.openai_api_key.is_none());
        assert!(!cfg.summaries_enabled());
    }

    #[test]
    fn rejects_missing_user() {
        let cfg = Config::parse("repositories: [a/b]\n").unwrap();
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn rejects_duplicates_and_empty() {
        let cfg = Config::parse("user: u\nrepositories: [a/b, a/b]\n").unwrap();
        let err = cfg.validate().unwrap_err().to_string();
        assert!(err.contains("duplicate"));

        let cfg = Config::parse("user: u\nrepositories: []\n").unwrap();
        assert!(cfg.validate().is_err());

        let cfg = Config::parse("user: u\nbranch_prefixes: ['']\nrepositories: [a/b]\n").unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn schedule_parsing() {
        let cfg = Config::parse(
            "user: u\nrepositories: [a/b]\nschedule:\n  daily_at: \"23:30\"\n  utc_offset: \"+08:00\"\n",
        )
        .unwrap();
        let trigger = cfg.schedule.trigger().unwrap().unwrap();
        assert_eq!(trigger.at.hour(), 23);
        assert_eq!(trigger.at.minute(), 30);
        assert_eq!(trigger.offset.whole_hours(), 8);

        let cfg =
            Config::parse("user: u\nrepositories: [a/b]\nschedule:\n  daily_at: \"25:99\"\n")
                .unwrap();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn load_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("daybook.yaml");
        std::fs::write(&path, SAMPLE).unwrap();
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.registry.repositories.len(), 2);
    }
}
