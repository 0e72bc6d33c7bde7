//! Statistics over stored runs and page results
//!
//! Every function here degrades to a neutral value on empty input instead of
//! failing: 100% uptime without runs, no percentile without samples.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::model::{Failure, Run, RunStatus, Severity};

/// Share of successful runs in percent, rounded to two decimals
///
/// Returns `100.0` when there are no runs.
pub fn uptime_percent(runs: &[Run]) -> f64 {
    if runs.is_empty() {
        return 100.0;
    }

    let successful = runs
        .iter()
        .filter(|run| run.status == RunStatus::Success)
        .count();

    round2(successful as f64 * 100.0 / runs.len() as f64)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Nearest-rank percentile
///
/// Sorts the samples and picks index `ceil(n * p / 100) - 1`, clamped to the
/// valid range. `None` when there are no samples.
pub fn percentile(mut samples: Vec<u32>, p: u32) -> Option<u32> {
    if samples.is_empty() {
        return None;
    }
    samples.sort_unstable();

    let rank = (samples.len() * p as usize).div_ceil(100);
    let index = rank.saturating_sub(1).min(samples.len() - 1);
    Some(samples[index])
}

/// Failure count per severity label, every severity present
pub fn severity_breakdown<'a>(
    failures: impl IntoIterator<Item = &'a Failure>,
) -> BTreeMap<&'static str, u32> {
    let mut breakdown: BTreeMap<&'static str, u32> =
        Severity::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for failure in failures {
        *breakdown.entry(failure.severity.as_str()).or_default() += 1;
    }
    breakdown
}

/// Overall health label shown on the overview
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthLabel {
    Healthy,
    Degraded,
    Down,
    Unknown,
}

impl HealthLabel {
    /// Label derived from the latest run of a site
    pub fn from_latest(latest: Option<&Run>) -> Self {
        match latest.map(|run| run.status) {
            Some(RunStatus::Success) => HealthLabel::Healthy,
            Some(RunStatus::Warning) => HealthLabel::Degraded,
            Some(RunStatus::Failed | RunStatus::Error) => HealthLabel::Down,
            Some(RunStatus::Running) | None => HealthLabel::Unknown,
        }
    }
}

/// Load and TTFB percentiles of a set of page results
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub p50_load_ms: Option<u32>,
    pub p95_load_ms: Option<u32>,
    pub p99_load_ms: Option<u32>,
    pub p95_ttfb_ms: Option<u32>,
}

impl PerformanceMetrics {
    /// Compute from `(load_ms, ttfb_ms)` pairs, ignoring missing values
    pub fn from_samples(samples: impl IntoIterator<Item = (Option<u32>, Option<u32>)>) -> Self {
        let (load, ttfb): (Vec<_>, Vec<_>) = samples.into_iter().unzip();
        let load: Vec<u32> = load.into_iter().flatten().collect();
        let ttfb: Vec<u32> = ttfb.into_iter().flatten().collect();

        Self {
            p50_load_ms: percentile(load.clone(), 50),
            p95_load_ms: percentile(load.clone(), 95),
            p99_load_ms: percentile(load, 99),
            p95_ttfb_ms: percentile(ttfb, 95),
        }
    }
}
