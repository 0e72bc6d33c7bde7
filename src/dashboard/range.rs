//! Symbolic time ranges for dashboard queries

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

/// Lookback window selectable by dashboard clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    LastHour,
    #[serde(rename = "6h")]
    LastSixHours,
    #[default]
    #[serde(rename = "24h")]
    LastDay,
    #[serde(rename = "7d")]
    LastWeek,
    #[serde(rename = "30d")]
    LastMonth,
}

impl TimeRange {
    /// Parse a range label, falling back to the last 24 hours for anything
    /// unrecognized (including a missing value)
    pub fn parse(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some("1h") => TimeRange::LastHour,
            Some("6h") => TimeRange::LastSixHours,
            Some("24h") => TimeRange::LastDay,
            Some("7d") => TimeRange::LastWeek,
            Some("30d") => TimeRange::LastMonth,
            _ => TimeRange::default(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::LastHour => "1h",
            TimeRange::LastSixHours => "6h",
            TimeRange::LastDay => "24h",
            TimeRange::LastWeek => "7d",
            TimeRange::LastMonth => "30d",
        }
    }

    pub fn duration(self) -> TimeDelta {
        match self {
            TimeRange::LastHour => TimeDelta::hours(1),
            TimeRange::LastSixHours => TimeDelta::hours(6),
            TimeRange::LastDay => TimeDelta::hours(24),
            TimeRange::LastWeek => TimeDelta::days(7),
            TimeRange::LastMonth => TimeDelta::days(30),
        }
    }

    /// `(now - duration, now)`
    pub fn window(self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        (now - self.duration(), now)
    }
}
