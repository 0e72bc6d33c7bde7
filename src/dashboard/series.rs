//! Time-series bucketing
//!
//! Samples are grouped into fixed-width buckets aligned to the Unix epoch, so
//! the same bucket boundaries come out no matter which window was queried.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::stats::round2;

/// Bucket width for time-series queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Bucket {
    /// One point per sample
    #[default]
    #[serde(rename = "raw")]
    Raw,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "1h")]
    Hour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "1d")]
    Day,
}

impl Bucket {
    /// Unknown or missing labels mean raw points
    pub fn parse(label: Option<&str>) -> Self {
        match label.map(str::trim) {
            Some("5m") => Bucket::FiveMinutes,
            Some("1h") => Bucket::Hour,
            Some("6h") => Bucket::SixHours,
            Some("1d") => Bucket::Day,
            _ => Bucket::Raw,
        }
    }

    pub fn width_secs(self) -> Option<i64> {
        match self {
            Bucket::Raw => None,
            Bucket::FiveMinutes => Some(5 * 60),
            Bucket::Hour => Some(60 * 60),
            Bucket::SixHours => Some(6 * 60 * 60),
            Bucket::Day => Some(24 * 60 * 60),
        }
    }
}

/// How samples falling into one bucket are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    Sum,
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataPoint {
    /// Sample time, or bucket start when bucketed
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    /// Number of samples behind this point
    pub count: usize,
}

/// Turn `(time, value)` samples into ascending data points
pub fn bucketize(
    samples: impl IntoIterator<Item = (DateTime<Utc>, f64)>,
    bucket: Bucket,
    aggregation: Aggregation,
) -> Vec<DataPoint> {
    let Some(width) = bucket.width_secs() else {
        let mut points: Vec<DataPoint> = samples
            .into_iter()
            .map(|(timestamp, value)| DataPoint {
                timestamp,
                value,
                count: 1,
            })
            .collect();
        points.sort_by_key(|point| point.timestamp);
        return points;
    };

    let mut buckets: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for (timestamp, value) in samples {
        let start = timestamp.timestamp().div_euclid(width) * width;
        let entry = buckets.entry(start).or_default();
        entry.0 += value;
        entry.1 += 1;
    }

    buckets
        .into_iter()
        .filter_map(|(start, (sum, count))| {
            let timestamp = DateTime::from_timestamp(start, 0)?;
            let value = match aggregation {
                Aggregation::Sum => sum,
                Aggregation::Mean => round2(sum / count as f64),
            };
            Some(DataPoint {
                timestamp,
                value,
                count,
            })
        })
        .collect()
}
