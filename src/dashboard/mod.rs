//! Read-only dashboard queries
//!
//! All statistics are computed on the fly from the run store for the
//! requested window. A missing site is the only hard error; empty windows
//! produce neutral values.

pub mod range;
pub mod report;
pub mod series;
pub mod stats;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::model::{
    Failure, FailureType, Run, RunId, RunRecord, RunStatus, Severity, Site, SiteId,
};
use crate::storage::{RunStore, StorageError};

pub use range::TimeRange;
pub use report::{ReportInputs, WeeklyReport};
pub use series::{Aggregation, Bucket, DataPoint};
pub use stats::{HealthLabel, PerformanceMetrics, percentile, uptime_percent};

/// Errors raised by dashboard queries
#[derive(Debug)]
pub enum DashboardError {
    SiteNotFound(SiteId),
    RunNotFound(RunId),
    Storage(StorageError),
}

impl fmt::Display for DashboardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashboardError::SiteNotFound(id) => write!(f, "site not found: {id}"),
            DashboardError::RunNotFound(id) => write!(f, "run not found: {id}"),
            DashboardError::Storage(err) => write!(f, "storage error: {err}"),
        }
    }
}

impl std::error::Error for DashboardError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DashboardError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for DashboardError {
    fn from(err: StorageError) -> Self {
        DashboardError::Storage(err)
    }
}

pub type DashboardResult<T> = Result<T, DashboardError>;

// ============================================================================
// Response types
// ============================================================================

/// Compact view of the latest run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastRun {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub status: RunStatus,
    pub critical_count: u32,
    pub major_count: u32,
    pub minor_count: u32,
}

impl From<&Run> for LastRun {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.id,
            started_at: run.started_at,
            status: run.status,
            critical_count: run.critical_count,
            major_count: run.major_count,
            minor_count: run.minor_count,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub site_id: SiteId,
    pub site_name: String,
    pub range: TimeRange,
    pub status: HealthLabel,
    pub uptime_percent: f64,
    pub issues_by_severity: BTreeMap<&'static str, u32>,
    pub performance: PerformanceMetrics,
    pub last_run: Option<LastRun>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeSeries {
    pub site_id: SiteId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub bucket: Bucket,
    pub label: &'static str,
    pub data_points: Vec<DataPoint>,
}

/// A failure as shown in run listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureView {
    pub severity: Severity,
    #[serde(rename = "type")]
    pub failure_type: FailureType,
    pub message: String,
    pub url: Option<String>,
    pub page_name: Option<String>,
}

impl FailureView {
    fn new(site: &Site, failure: Failure) -> Self {
        let page_name = failure
            .page_id
            .and_then(|id| site.page(id))
            .map(|page| page.name.clone());

        Self {
            severity: failure.severity,
            failure_type: failure.failure_type,
            message: failure.message,
            url: failure.url,
            page_name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    #[serde(flatten)]
    pub run: Run,
    pub failures: Vec<FailureView>,
}

// ============================================================================
// Service
// ============================================================================

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn RunStore>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    async fn site(&self, site_id: SiteId) -> DashboardResult<Site> {
        self.store
            .get_site(site_id)
            .await?
            .ok_or(DashboardError::SiteNotFound(site_id))
    }

    /// Status, uptime, issue counts and percentiles over `range`
    #[instrument(skip(self))]
    pub async fn overview(
        &self,
        site_id: SiteId,
        range: TimeRange,
        now: DateTime<Utc>,
    ) -> DashboardResult<Overview> {
        let site = self.site(site_id).await?;
        let (from, to) = range.window(now);

        let runs = self.store.runs_in_range(site_id, from, to).await?;
        let failures = self.store.failures_in_range(site_id, from, to).await?;
        let results = self.store.page_results_in_range(site_id, from, to).await?;
        let latest = self.store.latest_run(site_id).await?;

        debug!(
            "overview over {} runs, {} failures, {} page results",
            runs.len(),
            failures.len(),
            results.len()
        );

        Ok(Overview {
            site_id,
            site_name: site.name,
            range,
            status: HealthLabel::from_latest(latest.as_ref()),
            uptime_percent: uptime_percent(&runs),
            issues_by_severity: stats::severity_breakdown(failures.iter().map(|f| &f.item)),
            performance: PerformanceMetrics::from_samples(
                results.iter().map(|r| (r.item.load_ms, r.item.ttfb_ms)),
            ),
            last_run: latest.as_ref().map(LastRun::from),
        })
    }

    /// Blocking issues (critical + major) per run
    #[instrument(skip(self))]
    pub async fn error_series(
        &self,
        site_id: SiteId,
        range: TimeRange,
        bucket: Bucket,
        now: DateTime<Utc>,
    ) -> DashboardResult<TimeSeries> {
        self.site(site_id).await?;
        let (from, to) = range.window(now);

        let runs = self.store.runs_in_range(site_id, from, to).await?;
        let samples = runs.iter().map(|run| {
            (
                run.started_at,
                f64::from(run.critical_count + run.major_count),
            )
        });

        Ok(TimeSeries {
            site_id,
            from,
            to,
            bucket,
            label: "Errors",
            data_points: series::bucketize(samples, bucket, Aggregation::Sum),
        })
    }

    /// Page load time per page result, averaged when bucketed
    #[instrument(skip(self))]
    pub async fn performance_series(
        &self,
        site_id: SiteId,
        range: TimeRange,
        bucket: Bucket,
        now: DateTime<Utc>,
    ) -> DashboardResult<TimeSeries> {
        self.site(site_id).await?;
        let (from, to) = range.window(now);

        let results = self.store.page_results_in_range(site_id, from, to).await?;
        let samples = results
            .iter()
            .filter_map(|r| r.item.load_ms.map(|load| (r.recorded_at, f64::from(load))));

        Ok(TimeSeries {
            site_id,
            from,
            to,
            bucket,
            label: "Load Time",
            data_points: series::bucketize(samples, bucket, Aggregation::Mean),
        })
    }

    /// Runs started in `[from, to]` with their failures, oldest first
    #[instrument(skip(self))]
    pub async fn runs(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> DashboardResult<Vec<RunSummary>> {
        let site = self.site(site_id).await?;

        let runs = self.store.runs_in_range(site_id, from, to).await?;
        let mut failures: HashMap<RunId, Vec<FailureView>> = HashMap::new();
        for stamped in self.store.failures_in_range(site_id, from, to).await? {
            failures
                .entry(stamped.run_id)
                .or_default()
                .push(FailureView::new(&site, stamped.item));
        }

        Ok(runs
            .into_iter()
            .map(|run| RunSummary {
                failures: failures.remove(&run.id).unwrap_or_default(),
                run,
            })
            .collect())
    }

    /// Full details of one run
    pub async fn run(&self, run_id: RunId) -> DashboardResult<RunRecord> {
        self.store
            .get_run(run_id)
            .await?
            .ok_or(DashboardError::RunNotFound(run_id))
    }

    /// Report data for the week ending at `now`
    #[instrument(skip(self))]
    pub async fn weekly_report(
        &self,
        site_id: SiteId,
        now: DateTime<Utc>,
    ) -> DashboardResult<WeeklyReport> {
        let site = self.site(site_id).await?;
        let week = TimeDelta::days(report::REPORT_DAYS);
        let from = now - week;
        let previous_from = from - week;

        // The previous week ends just before this one starts
        let previous_to = from - TimeDelta::milliseconds(1);

        let inputs = ReportInputs {
            runs: self.store.runs_in_range(site_id, from, now).await?,
            failures: self.store.failures_in_range(site_id, from, now).await?,
            page_results: self.store.page_results_in_range(site_id, from, now).await?,
            previous_results: self
                .store
                .page_results_in_range(site_id, previous_from, previous_to)
                .await?,
            request_errors: self.store.request_errors_in_range(site_id, from, now).await?,
        };

        Ok(WeeklyReport::compile(&site, now, &inputs))
    }
}
