//! Coordination store key layout.
//!
//! ```text
//! report:{date}                    final report (long TTL)
//! temp:{date}:{repo}:{branch}      partial result (short TTL)
//! progress:{date}                  progress tracker (short TTL)
//! discovery:{date}:{repo}          discovery fan-out record (short TTL)
//! ```
//!
//! Summaries reuse the `report:{date}` shape in their own namespace.

use crate::date::ReportDate;

pub fn report_key(date: ReportDate) -> String {
    format!("report:{date}")
}

pub fn temp_key(date: ReportDate, repo: &str, branch: &str) -> String {
    format!("temp:{date}:{repo}:{branch}")
}

pub fn progress_key(date: ReportDate) -> String {
    format!("progress:{date}")
}

pub fn discovery_key(date: ReportDate, repo: &str) -> String {
    format!("discovery:{date}:{repo}")
}

pub fn summary_key(date: ReportDate) -> String {
    report_key(date)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d() -> ReportDate {
        ReportDate::parse("2024-01-05").unwrap()
    }

    #[test]
    fn key_shapes() {
        assert_eq!(report_key(d()), "report:2024-01-05");
        assert_eq!(
            temp_key(d(), "acme/api", "feat/login"),
            "temp:2024-01-05:acme/api:feat/login"
        );
        assert_eq!(progress_key(d()), "progress:2024-01-05");
        assert_eq!(discovery_key(d(), "acme/api"), "discovery:2024-01-05:acme/api");
    }

    #[test]
    fn temp_keys_unique_per_triple() {
        let a = temp_key(d(), "acme/api", "main");
        let b = temp_key(d(), "acme/api", "staging");
        let c = temp_key(d(), "acme/web", "main");
        let e = temp_key(ReportDate::parse("2024-01-06").unwrap(), "acme/api", "main");
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, e);
    }
}
