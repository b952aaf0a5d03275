//! Coarse, human-readable durations ("3 hours", "about 2 weeks" style labels).

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::model::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
    Weeks,
    Months,
    Years,
}

impl TimeUnit {
    fn noun(self, amount: i64) -> &'static str {
        let singular = amount == 1;
        match (self, singular) {
            (Self::Seconds, _) => "seconds",
            (Self::Minutes, true) => "minute",
            (Self::Minutes, false) => "minutes",
            (Self::Hours, true) => "hour",
            (Self::Hours, false) => "hours",
            (Self::Days, true) => "day",
            (Self::Days, false) => "days",
            (Self::Weeks, true) => "week",
            (Self::Weeks, false) => "weeks",
            (Self::Months, true) => "month",
            (Self::Months, false) => "months",
            (Self::Years, true) => "year",
            (Self::Years, false) => "years",
        }
    }
}

/// A span reduced to its coarsest whole unit, floored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RelativeDuration {
    pub amount: i64,
    pub unit: TimeUnit,
}

impl RelativeDuration {
    /// Sign is ignored; callers decide between "in ..." and "... ago".
    pub fn from_delta(delta: TimeDelta) -> Self {
        let secs = delta.num_seconds().saturating_abs();
        let minutes = secs / 60;
        let hours = minutes / 60;
        let days = hours / 24;
        let (amount, unit) = if minutes < 1 {
            (secs, TimeUnit::Seconds)
        } else if hours < 1 {
            (minutes, TimeUnit::Minutes)
        } else if days < 1 {
            (hours, TimeUnit::Hours)
        } else if days < 7 {
            (days, TimeUnit::Days)
        } else if days < 30 {
            (days / 7, TimeUnit::Weeks)
        } else if days < 365 {
            (days / 30, TimeUnit::Months)
        } else {
            (days / 365, TimeUnit::Years)
        };
        Self { amount, unit }
    }
}

impl fmt::Display for RelativeDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit == TimeUnit::Seconds {
            return f.write_str("less than a minute");
        }
        write!(f, "{} {}", self.amount, self.unit.noun(self.amount))
    }
}

/// "3 hours ago", "in 2 days", "Never" for no timestamp, "Unknown" when unparseable.
pub fn relative_time(timestamp: Option<&Timestamp>, now: DateTime<Utc>) -> String {
    let Some(timestamp) = timestamp else {
        return "Never".to_string();
    };
    let Some(at) = timestamp.parse() else {
        return "Unknown".to_string();
    };
    let span = RelativeDuration::from_delta(now - at);
    if at > now {
        format!("in {span}")
    } else {
        format!("{span} ago")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, 12, 0, 0).single().unwrap()
    }

    fn label(delta: TimeDelta) -> String {
        RelativeDuration::from_delta(delta).to_string()
    }

    #[test]
    fn durations_floor_to_the_coarsest_unit() {
        assert_eq!(label(TimeDelta::seconds(59)), "less than a minute");
        assert_eq!(label(TimeDelta::seconds(61)), "1 minute");
        assert_eq!(label(TimeDelta::minutes(59)), "59 minutes");
        assert_eq!(label(TimeDelta::hours(3)), "3 hours");
        assert_eq!(label(TimeDelta::hours(25)), "1 day");
        assert_eq!(label(TimeDelta::days(6)), "6 days");
        assert_eq!(label(TimeDelta::days(10)), "1 week");
        assert_eq!(label(TimeDelta::days(29)), "4 weeks");
        assert_eq!(label(TimeDelta::days(75)), "2 months");
        assert_eq!(label(TimeDelta::days(800)), "2 years");
        assert_eq!(label(TimeDelta::hours(-3)), "3 hours");
    }

    #[test]
    fn relative_time_handles_missing_and_garbage() {
        assert_eq!(relative_time(None, now()), "Never");
        assert_eq!(relative_time(Some(&Timestamp::new("soon-ish")), now()), "Unknown");
    }

    #[test]
    fn relative_time_reads_past_and_future() {
        let past = Timestamp::from_datetime(now() - TimeDelta::minutes(5));
        assert_eq!(relative_time(Some(&past), now()), "5 minutes ago");
        let future = Timestamp::from_datetime(now() + TimeDelta::days(2));
        assert_eq!(relative_time(Some(&future), now()), "in 2 days");
        let naive = Timestamp::new("2025-03-09T12:00:00");
        assert_eq!(relative_time(Some(&naive), now()), "1 day ago");
    }
}
