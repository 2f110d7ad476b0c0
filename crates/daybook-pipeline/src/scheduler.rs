//! Time-based trigger: decompose "today" once a day at a wall-clock time.

use std::sync::Arc;

use anyhow::Result;
use daybook_core::config::DailyTrigger;
use daybook_core::ReportDate;
use time::{Duration, OffsetDateTime};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::Pipeline;

/// Next instant strictly after `now` at which `trigger` fires, in the
/// trigger's offset.
pub fn next_fire(now: OffsetDateTime, trigger: &DailyTrigger) -> OffsetDateTime {
    let local = now.to_offset(trigger.offset);
    let today = local.date().with_time(trigger.at).assume_offset(trigger.offset);
    if today > local {
        today
    } else {
        today + Duration::days(1)
    }
}

pub async fn run_daily(
    pipeline: Arc<Pipeline>,
    trigger: DailyTrigger,
    cancel: CancellationToken,
) -> Result<()> {
    loop {
        let now = OffsetDateTime::now_utc();
        let fire_at = next_fire(now, &trigger);
        let wait = std::time::Duration::try_from(fire_at - now).unwrap_or_default();
        info!(next = %fire_at, "daily trigger scheduled");

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(wait) => {}
        }

        let date = ReportDate::from_date(fire_at.date());
        match pipeline.decompose(date).await {
            Ok(jobs) => info!(%date, jobs, "daily trigger fired"),
            Err(e) => error!(%date, error = %format!("{e:#}"), "daily trigger failed"),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset, time};

    fn trigger() -> DailyTrigger {
        DailyTrigger {
            at: time!(23:55),
            offset: offset!(+8),
        }
    }

    #[test]
    fn fires_later_today() {
        let now = datetime!(2024-01-05 10:00 UTC); // 18:00 at +8
        assert_eq!(next_fire(now, &trigger()), datetime!(2024-01-05 23:55 +8));
    }

    #[test]
    fn rolls_to_tomorrow_once_passed() {
        let now = datetime!(2024-01-05 16:00 UTC); // 00:00 on the 6th at +8
        assert_eq!(next_fire(now, &trigger()), datetime!(2024-01-06 23:55 +8));
        let exact = datetime!(2024-01-05 23:55 +8);
        assert_eq!(next_fire(exact, &trigger()), datetime!(2024-01-06 23:55 +8));
    }

    #[test]
    fn fire_date_is_local() {
        let fire = next_fire(datetime!(2024-01-05 10:00 UTC), &trigger());
        assert_eq!(ReportDate::from_date(fire.date()).to_string(), "2024-01-05");
    }
}
