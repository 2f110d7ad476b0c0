use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateError {
    #[error("invalid date format `{0}`, expected YYYY-MM-DD")]
    Format(String),
    #[error("`{0}` is not a calendar date")]
    Calendar(String),
}

fn date_shape() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static regex"))
}

/// Shape check only (`^\d{4}-\d{2}-\d{2}$`), as applied to request paths.
pub fn is_date_shaped(s: &str) -> bool {
    date_shape().is_match(s)
}

/// A calendar day in `YYYY-MM-DD` form. The unit a report covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReportDate(Date);

impl ReportDate {
    pub fn parse(s: &str) -> Result<Self, DateError> {
        if !is_date_shaped(s) {
            return Err(DateError::Format(s.to_string()));
        }
        Date::parse(s, format_description!("[year]-[month]-[day]"))
            .map(Self)
            .map_err(|_| DateError::Calendar(s.to_string()))
    }

    pub fn from_date(date: Date) -> Self {
        Self(date)
    }

    pub fn today_utc() -> Self {
        Self(OffsetDateTime::now_utc().date())
    }

    /// Today's date as seen from a fixed UTC offset.
    pub fn today_in(offset: UtcOffset) -> Self {
        Self(OffsetDateTime::now_utc().to_offset(offset).date())
    }

    /// UTC calendar day of an RFC 3339 timestamp, ignoring time-of-day.
    ///
    /// Timestamps that do not parse fall back to their leading `YYYY-MM-DD`.
    pub fn utc_day_of(timestamp: &str) -> Option<Self> {
        if let Ok(ts) = OffsetDateTime::parse(timestamp, &Rfc3339) {
            return Some(Self(ts.to_offset(UtcOffset::UTC).date()));
        }
        timestamp.get(..10).and_then(|prefix| Self::parse(prefix).ok())
    }
}

impl fmt::Display for ReportDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02}",
            self.0.year(),
            u8::from(self.0.month()),
            self.0.day()
        )
    }
}

impl std::str::FromStr for ReportDate {
    type Err = DateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ReportDate {
    type Error = DateError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<ReportDate> for String {
    fn from(d: ReportDate) -> Self {
        d.to_string()
    }
}

/// Current UTC time as RFC 3339 with millisecond precision (`2024-01-05T10:00:00.000Z`).
pub fn now_rfc3339() -> String {
    let now = OffsetDateTime::now_utc();
    now.format(format_description!(
        "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z"
    ))
    .unwrap_or_default()
}
