//! Weekly site report
//!
//! Only the report data is produced here; rendering and delivery to the
//! site's alert recipients are left to whoever consumes it.

use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use serde::Serialize;

use crate::model::{Failure, FailureType, PageResult, RequestError, Run, Site, SiteId, Stamped};

use super::stats::{percentile, round2, severity_breakdown, uptime_percent};

const TOP_ISSUES: usize = 5;
const SLOWEST_PAGES: usize = 5;
const TOP_NOT_FOUND: usize = 10;

/// Length of the report week in days
pub const REPORT_DAYS: i64 = 7;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekPerformance {
    pub p95_load_ms: Option<u32>,
    pub p95_ttfb_ms: Option<u32>,
}

impl WeekPerformance {
    fn from_results(results: &[Stamped<PageResult>]) -> Self {
        Self {
            p95_load_ms: percentile(results.iter().filter_map(|r| r.item.load_ms).collect(), 95),
            p95_ttfb_ms: percentile(results.iter().filter_map(|r| r.item.ttfb_ms).collect(), 95),
        }
    }
}

/// A failure that keeps coming back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecurringIssue {
    #[serde(rename = "type")]
    pub failure_type: FailureType,
    pub message: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlowPage {
    pub page_name: String,
    pub avg_load_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingAsset {
    pub url: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyReport {
    pub site_id: SiteId,
    pub site_name: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub uptime_percent: f64,
    pub failures_by_severity: BTreeMap<&'static str, u32>,
    pub performance: WeekPerformance,
    pub previous_week_performance: WeekPerformance,
    pub top_issues: Vec<RecurringIssue>,
    pub slowest_pages: Vec<SlowPage>,
    pub top_404_assets: Vec<MissingAsset>,
}

/// Stored data a report is compiled from
///
/// `previous_results` covers the week before `[now - 7d, now]`, everything
/// else the week itself.
#[derive(Debug, Default)]
pub struct ReportInputs {
    pub runs: Vec<Run>,
    pub failures: Vec<Stamped<Failure>>,
    pub page_results: Vec<Stamped<PageResult>>,
    pub previous_results: Vec<Stamped<PageResult>>,
    pub request_errors: Vec<Stamped<RequestError>>,
}

impl WeeklyReport {
    pub fn compile(site: &Site, now: DateTime<Utc>, inputs: &ReportInputs) -> Self {
        let failures: Vec<&Failure> = inputs.failures.iter().map(|f| &f.item).collect();

        Self {
            site_id: site.id,
            site_name: site.name.clone(),
            week_start: (now - TimeDelta::days(REPORT_DAYS)).date_naive(),
            week_end: now.date_naive(),
            uptime_percent: uptime_percent(&inputs.runs),
            failures_by_severity: severity_breakdown(failures.iter().copied()),
            performance: WeekPerformance::from_results(&inputs.page_results),
            previous_week_performance: WeekPerformance::from_results(&inputs.previous_results),
            top_issues: top_issues(&failures),
            slowest_pages: slowest_pages(site, &inputs.page_results),
            top_404_assets: top_not_found(&inputs.request_errors),
        }
    }
}

fn top_issues(failures: &[&Failure]) -> Vec<RecurringIssue> {
    let mut counts: HashMap<(FailureType, &str), u32> = HashMap::new();
    for failure in failures {
        *counts
            .entry((failure.failure_type, failure.message.as_str()))
            .or_default() += 1;
    }

    let mut issues: Vec<RecurringIssue> = counts
        .into_iter()
        .map(|((failure_type, message), count)| RecurringIssue {
            failure_type,
            message: message.to_string(),
            count,
        })
        .collect();
    issues.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.failure_type.as_str().cmp(b.failure_type.as_str()))
            .then_with(|| a.message.cmp(&b.message))
    });
    issues.truncate(TOP_ISSUES);
    issues
}

fn slowest_pages(site: &Site, results: &[Stamped<PageResult>]) -> Vec<SlowPage> {
    let mut loads: HashMap<i64, (u64, u64)> = HashMap::new();
    for result in results {
        if let Some(load) = result.item.load_ms {
            let entry = loads.entry(result.item.page_id).or_default();
            entry.0 += u64::from(load);
            entry.1 += 1;
        }
    }

    let mut pages: Vec<SlowPage> = loads
        .into_iter()
        .map(|(page_id, (total, samples))| SlowPage {
            page_name: site
                .page(page_id)
                .map(|page| page.name.clone())
                .unwrap_or_else(|| format!("page {page_id}")),
            avg_load_ms: round2(total as f64 / samples as f64),
        })
        .collect();
    pages.sort_by(|a, b| {
        b.avg_load_ms
            .total_cmp(&a.avg_load_ms)
            .then_with(|| a.page_name.cmp(&b.page_name))
    });
    pages.truncate(SLOWEST_PAGES);
    pages
}

fn top_not_found(errors: &[Stamped<RequestError>]) -> Vec<MissingAsset> {
    let mut counts: HashMap<&str, u32> = HashMap::new();
    for error in errors.iter().filter(|e| e.item.status == Some(404)) {
        *counts.entry(error.item.url.as_str()).or_default() += 1;
    }

    let mut assets: Vec<MissingAsset> = counts
        .into_iter()
        .map(|(url, count)| MissingAsset {
            url: url.to_string(),
            count,
        })
        .collect();
    assets.sort_by_key(|asset| (Reverse(asset.count), asset.url.clone()));
    assets.truncate(TOP_NOT_FOUND);
    assets
}
