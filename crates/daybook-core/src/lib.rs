pub mod branch;
pub mod config;
pub mod date;
pub mod job;
pub mod keys;
pub mod summary_text;
pub mod types;

pub use branch::BranchConvention;
pub use config::{Config, ConfigError, Registry};
pub use date::{now_rfc3339, DateError, ReportDate};
pub use job::Job;
pub use types::*;
