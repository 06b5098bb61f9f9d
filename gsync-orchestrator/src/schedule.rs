//! Next-run prediction for a profile's cron schedule.
//!
//! Cron fields are evaluated in the profile's own zone, so "now" is localised
//! before matching. Anything that cannot be parsed yields
//! [`NextRun::Unavailable`] instead of an error.

use std::str::FromStr;

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use chrono_tz::Tz;
use croner::Cron;
use serde::Serialize;
use tracing::debug;

pub const UNAVAILABLE: &str = "N/A";
pub const DISABLED: &str = "Disabled";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NextRun {
    Scheduled {
        at: DateTime<FixedOffset>,
        #[serde(skip)]
        until: Duration,
    },
    Unavailable,
    Disabled,
}

impl NextRun {
    /// Local wall-clock time of the next run, or a sentinel.
    pub fn next_run_display(&self) -> String {
        match self {
            Self::Scheduled { at, .. } => at.format("%Y-%m-%d %H:%M:%S").to_string(),
            Self::Unavailable => UNAVAILABLE.to_string(),
            Self::Disabled => DISABLED.to_string(),
        }
    }

    /// `"<h>h <m>m"` until the next run, or a sentinel.
    pub fn time_until_display(&self) -> String {
        match self {
            Self::Scheduled { until, .. } => format_time_until(*until),
            Self::Unavailable => UNAVAILABLE.to_string(),
            Self::Disabled => DISABLED.to_string(),
        }
    }
}

/// Whole hours and minutes, truncated. Negative spans clamp to zero.
pub fn format_time_until(until: Duration) -> String {
    let minutes = until.num_minutes().max(0);
    format!("{}h {}m", minutes / 60, minutes % 60)
}

/// First instant at or after `now` (truncated to the second) matching
/// `expression` in `timezone`.
pub fn predict(expression: &str, timezone: &str, now: DateTime<Utc>) -> NextRun {
    let Ok(tz) = Tz::from_str(timezone.trim()) else {
        debug!(timezone, "unknown timezone, next run unavailable");
        return NextRun::Unavailable;
    };
    let cron = match Cron::new(expression.trim()).parse() {
        Ok(cron) => cron,
        Err(e) => {
            debug!(expression, error = %e, "unparseable cron expression");
            return NextRun::Unavailable;
        }
    };

    let now = now.with_nanosecond(0).unwrap_or(now);
    let local = now.with_timezone(&tz);
    match cron.find_next_occurrence(&local, true) {
        Ok(next) => NextRun::Scheduled {
            at: next.fixed_offset(),
            until: next.with_timezone(&Utc) - now,
        },
        Err(e) => {
            debug!(expression, error = %e, "no upcoming occurrence");
            NextRun::Unavailable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_next_day_in_utc() {
        let next = predict("0 3 * * *", "UTC", utc(2024, 1, 1, 4, 0, 0));
        match &next {
            NextRun::Scheduled { at, .. } => {
                assert_eq!(at.with_timezone(&Utc), utc(2024, 1, 2, 3, 0, 0));
            }
            other => panic!("expected a scheduled run, got {other:?}"),
        }
        assert_eq!(next.time_until_display(), "23h 0m");
        assert_eq!(next.next_run_display(), "2024-01-02 03:00:00");
    }

    #[test]
    fn test_match_at_reference_is_inclusive() {
        let now = utc(2024, 1, 1, 3, 0, 0);
        let next = predict("0 3 * * *", "UTC", now);
        assert_eq!(next.time_until_display(), "0h 0m");
    }

    #[test]
    fn test_fields_are_evaluated_in_local_time() {
        // 02:00 in Rome is 01:00 UTC in winter.
        let next = predict("0 2 * * *", "Europe/Rome", utc(2024, 1, 10, 0, 30, 0));
        match next {
            NextRun::Scheduled { at, until } => {
                assert_eq!(at.with_timezone(&Utc), utc(2024, 1, 10, 1, 0, 0));
                assert_eq!(at.format("%H:%M").to_string(), "02:00");
                assert_eq!(format_time_until(until), "0h 30m");
            }
            other => panic!("expected a scheduled run, got {other:?}"),
        }
    }

    #[test]
    fn test_minutes_are_truncated() {
        let next = predict("*/15 * * * *", "UTC", utc(2024, 1, 1, 4, 0, 59));
        assert_eq!(next.time_until_display(), "0h 14m");
    }

    #[test]
    fn test_unavailable_on_bad_input() {
        let now = utc(2024, 1, 1, 0, 0, 0);
        assert_eq!(predict("not a cron", "UTC", now), NextRun::Unavailable);
        assert_eq!(predict("0 3 * * *", "Nowhere/Special", now), NextRun::Unavailable);
        assert_eq!(NextRun::Unavailable.next_run_display(), "N/A");
        assert_eq!(NextRun::Disabled.time_until_display(), "Disabled");
    }

    #[test]
    fn test_format_time_until() {
        assert_eq!(format_time_until(Duration::minutes(61)), "1h 1m");
        assert_eq!(format_time_until(Duration::seconds(-30)), "0h 0m");
        assert_eq!(format_time_until(Duration::hours(49)), "49h 0m");
    }
}
