//! Layout markers of human-readable summaries.
//!
//! A summary reads:
//!
//! ```text
//! Date: 2024-01-05
//!
//! DONE
//! [Area] ...
//!
//! IMPACT
//! - ...
//!
//! METRICS
//! Total commits: 3
//! Repositories touched: 2
//! ```
//!
//! or `Date: <date>` followed by `NONE` for a day without activity.

pub const DATE_PREFIX: &str = "Date:";
pub const DONE: &str = "DONE";
pub const IMPACT: &str = "IMPACT";
pub const METRICS: &str = "METRICS";
pub const NONE: &str = "NONE";

const SECTION_HEADERS: [&str; 4] = [DONE, IMPACT, METRICS, NONE];

/// True when `text` carries the summary layout: a leading `Date:` line or a
/// bare section header line.
pub fn looks_like_summary(text: &str) -> bool {
    let trimmed = text.trim_start();
    if trimmed.starts_with(DATE_PREFIX) {
        return true;
    }
    trimmed
        .lines()
        .any(|line| SECTION_HEADERS.contains(&line.trim()))
}

/// Summary text for a day without activity.
pub fn empty_day(date: &str) -> String {
    format!("{DATE_PREFIX} {date}\n\n{NONE}")
}
