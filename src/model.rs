//! Domain model shared by the check pipeline, storage and dashboards
//!
//! Wire names follow the ingestion and live-event contracts (camelCase fields,
//! SCREAMING_SNAKE_CASE enums), so these types can be sent over HTTP as-is.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SiteId = i64;
pub type PageId = i64;
pub type RunId = i64;

/// Severity of a detected problem
///
/// Ranked CRITICAL > MAJOR > MINOR. The ranking drives the run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    Major,
    Minor,
}

impl Severity {
    pub const ALL: [Severity; 3] = [Severity::Critical, Severity::Major, Severity::Minor];

    /// Higher is worse
    pub fn rank(self) -> u8 {
        match self {
            Severity::Critical => 3,
            Severity::Major => 2,
            Severity::Minor => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Major => "MAJOR",
            Severity::Minor => "MINOR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Severity::ALL
            .into_iter()
            .find(|severity| severity.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("severity", s))
    }
}

/// Closed set of failure classifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureType {
    NavigationFailed,
    PageCrash,
    JsError,
    ConsoleError,
    #[serde(rename = "XHR_5XX")]
    Xhr5xx,
    #[serde(rename = "XHR_4XX")]
    Xhr4xx,
    #[serde(rename = "ASSET_404")]
    Asset404,
    #[serde(rename = "CSS_404")]
    Css404,
    #[serde(rename = "JS_404")]
    Js404,
    #[serde(rename = "IMG_404")]
    Img404,
    #[serde(rename = "FONT_404")]
    Font404,
    Timeout,
    SlowTtfb,
    SlowDom,
    SlowLoad,
    RequestFailed,
}

impl FailureType {
    pub const ALL: [FailureType; 16] = [
        FailureType::NavigationFailed,
        FailureType::PageCrash,
        FailureType::JsError,
        FailureType::ConsoleError,
        FailureType::Xhr5xx,
        FailureType::Xhr4xx,
        FailureType::Asset404,
        FailureType::Css404,
        FailureType::Js404,
        FailureType::Img404,
        FailureType::Font404,
        FailureType::Timeout,
        FailureType::SlowTtfb,
        FailureType::SlowDom,
        FailureType::SlowLoad,
        FailureType::RequestFailed,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            FailureType::NavigationFailed => "NAVIGATION_FAILED",
            FailureType::PageCrash => "PAGE_CRASH",
            FailureType::JsError => "JS_ERROR",
            FailureType::ConsoleError => "CONSOLE_ERROR",
            FailureType::Xhr5xx => "XHR_5XX",
            FailureType::Xhr4xx => "XHR_4XX",
            FailureType::Asset404 => "ASSET_404",
            FailureType::Css404 => "CSS_404",
            FailureType::Js404 => "JS_404",
            FailureType::Img404 => "IMG_404",
            FailureType::Font404 => "FONT_404",
            FailureType::Timeout => "TIMEOUT",
            FailureType::SlowTtfb => "SLOW_TTFB",
            FailureType::SlowDom => "SLOW_DOM",
            FailureType::SlowLoad => "SLOW_LOAD",
            FailureType::RequestFailed => "REQUEST_FAILED",
        }
    }
}

impl fmt::Display for FailureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureType {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FailureType::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("failure type", s))
    }
}

/// Lifecycle status of a run
///
/// `Running` is transient and never persisted on its own; every stored run
/// carries one of the terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Success,
    Warning,
    Failed,
    Error,
}

impl RunStatus {
    pub const ALL: [RunStatus; 5] = [
        RunStatus::Running,
        RunStatus::Success,
        RunStatus::Warning,
        RunStatus::Failed,
        RunStatus::Error,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Warning => "WARNING",
            RunStatus::Failed => "FAILED",
            RunStatus::Error => "ERROR",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RunStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant::new("run status", s))
    }
}

/// Error returned when parsing one of the enums above from storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown {}: {}", self.kind, self.value)
    }
}

impl std::error::Error for UnknownVariant {}

/// A monitored target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Site {
    pub id: SiteId,
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    /// Check interval; falls back to the scheduler default when unset
    pub frequency_seconds: Option<u64>,
    #[serde(default)]
    pub alert_recipients: Vec<String>,
    #[serde(default)]
    pub pages: Vec<Page>,
}

impl Site {
    pub fn enabled_pages(&self) -> impl Iterator<Item = &Page> {
        self.pages.iter().filter(|page| page.enabled)
    }

    pub fn page(&self, page_id: PageId) -> Option<&Page> {
        self.pages.iter().find(|page| page.id == page_id)
    }

    /// Configuration handed to the check executor (enabled pages only)
    pub fn check_config(&self) -> SiteConfig {
        SiteConfig {
            site_id: self.id,
            name: self.name.clone(),
            base_url: self.base_url.clone(),
            pages: self
                .enabled_pages()
                .map(|page| PageConfig {
                    page_id: page.id,
                    name: page.name.clone(),
                    path: page.path.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: PageId,
    pub name: String,
    pub path: String,
    pub enabled: bool,
}

/// Site configuration as fetched by the executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub site_id: SiteId,
    pub name: String,
    pub base_url: String,
    pub pages: Vec<PageConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageConfig {
    pub page_id: PageId,
    pub name: String,
    pub path: String,
}

/// Join a site base URL and a page path without doubling or dropping slashes
pub fn page_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

/// Per-page metrics for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult {
    pub page_id: PageId,
    pub final_url: String,
    pub ttfb_ms: Option<u32>,
    pub dom_ms: Option<u32>,
    pub load_ms: Option<u32>,
    #[serde(default)]
    pub requests_count: u32,
    #[serde(default)]
    pub total_bytes: u64,
}

/// One classified problem
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    #[serde(default)]
    pub page_id: Option<PageId>,
    pub severity: Severity,
    #[serde(rename = "type")]
    pub failure_type: FailureType,
    pub message: String,
    #[serde(default)]
    pub url: Option<String>,
}

impl Failure {
    pub fn new(severity: Severity, failure_type: FailureType, message: impl Into<String>) -> Self {
        Self {
            page_id: None,
            severity,
            failure_type,
            message: message.into(),
            url: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn on_page(mut self, page_id: PageId) -> Self {
        self.page_id = Some(page_id);
        self
    }
}

/// One failed or erroring HTTP exchange, informational
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestError {
    #[serde(default)]
    pub page_id: Option<PageId>,
    pub resource_type: String,
    pub url: String,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Failure tally by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    pub critical: u32,
    pub major: u32,
    pub minor: u32,
}

impl SeverityCounts {
    pub fn tally<'a>(failures: impl IntoIterator<Item = &'a Failure>) -> Self {
        let mut counts = Self::default();
        for failure in failures {
            counts.add(failure.severity);
        }
        counts
    }

    pub fn add(&mut self, severity: Severity) {
        match severity {
            Severity::Critical => self.critical += 1,
            Severity::Major => self.major += 1,
            Severity::Minor => self.minor += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.critical + self.major + self.minor
    }
}

/// Completed run results as submitted to ingestion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSubmission {
    pub site_id: SiteId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: RunStatus,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub page_results: Vec<PageResult>,
    #[serde(default)]
    pub failures: Vec<Failure>,
    #[serde(default)]
    pub request_errors: Vec<RequestError>,
}

/// A finalized, persisted run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Run {
    pub id: RunId,
    pub site_id: SiteId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: RunStatus,
    pub critical_count: u32,
    pub major_count: u32,
    pub minor_count: u32,
    pub summary: Option<String>,
}

/// A run ready to be persisted, with all of its children
#[derive(Debug, Clone, PartialEq)]
pub struct NewRun {
    pub site_id: SiteId,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub status: RunStatus,
    pub counts: SeverityCounts,
    pub summary: Option<String>,
    pub page_results: Vec<PageResult>,
    pub failures: Vec<Failure>,
    pub request_errors: Vec<RequestError>,
}

/// A persisted run together with its children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub run: Run,
    pub page_results: Vec<PageResult>,
    pub failures: Vec<Failure>,
    pub request_errors: Vec<RequestError>,
}

/// A stored child row stamped with its run's identity and time
///
/// Range queries return children in this shape so dashboards can bucket by
/// time without a second lookup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stamped<T> {
    pub run_id: RunId,
    pub recorded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub item: T,
}
