//! Check executor
//!
//! Drives one run over a site's enabled pages:
//!
//! ```text
//! launch ─┬─ page 1: session → observers → navigate → load → timing → close
//!         ├─ page 2: ...
//!         └─ close browser → RunAggregator::finish
//! ```
//!
//! Pages are visited one at a time and each gets a fresh session. A failing
//! page becomes a single NAVIGATION_FAILED failure and the run moves on; only
//! a browser that cannot be launched ends the run early (status ERROR).

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::aggregator::RunAggregator;
use crate::browser::{
    Browser, BrowserEngine, BrowserError, LaunchOptions, NavigationTiming, PageSession,
};
use crate::model::{
    Failure, FailureType, PageConfig, PageResult, RequestError, RunSubmission, Severity,
    SiteConfig, page_url,
};

use super::console::ConsoleCollector;
use super::network::NetworkCollector;
use super::perf::PerfCollector;

/// Settings applied to every run
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    pub launch: LaunchOptions,
    pub navigation_timeout: Duration,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            launch: LaunchOptions::default(),
            navigation_timeout: Duration::from_millis(30_000),
        }
    }
}

/// Everything one page contributed to a run
#[derive(Debug)]
struct PageOutcome {
    result: PageResult,
    failures: Vec<Failure>,
    request_errors: Vec<RequestError>,
}

/// Runs checks against a browser engine
#[derive(Clone)]
pub struct CheckExecutor {
    engine: Arc<dyn BrowserEngine>,
    options: ExecutorOptions,
}

impl CheckExecutor {
    pub fn new(engine: Arc<dyn BrowserEngine>, options: ExecutorOptions) -> Self {
        Self { engine, options }
    }

    /// Execute one run and return it in ingestion form
    ///
    /// Never fails: every problem ends up in the returned submission.
    #[instrument(skip_all, fields(site = %site.name, site_id = site.site_id))]
    pub async fn execute(&self, site: &SiteConfig) -> RunSubmission {
        info!("starting check of {} pages", site.pages.len());

        let started_at = Utc::now();
        let mut aggregator = RunAggregator::new();

        let browser = match self.engine.launch(&self.options.launch).await {
            Ok(browser) => browser,
            Err(e) => {
                error!("fatal error during check execution: {e}");
                let verdict = aggregator.abort(&e);
                return RunSubmission {
                    site_id: site.site_id,
                    started_at,
                    ended_at: Utc::now(),
                    status: verdict.status,
                    summary: Some(verdict.summary),
                    page_results: Vec::new(),
                    failures: Vec::new(),
                    request_errors: Vec::new(),
                };
            }
        };

        let mut page_results = Vec::with_capacity(site.pages.len());
        let mut failures = Vec::new();
        let mut request_errors = Vec::new();

        for page in &site.pages {
            let url = page_url(&site.base_url, &page.path);

            match self.execute_page(browser.as_ref(), page, &url).await {
                Ok(outcome) => {
                    aggregator.page_completed();
                    aggregator.record_all(&outcome.failures);
                    page_results.push(outcome.result);
                    failures.extend(outcome.failures);
                    request_errors.extend(outcome.request_errors);
                }
                Err(e) => {
                    warn!(page = %page.name, "failed to execute page: {e}");
                    let failure = Failure::new(
                        Severity::Critical,
                        FailureType::NavigationFailed,
                        format!("Failed to navigate to page: {e}"),
                    )
                    .with_url(url)
                    .on_page(page.page_id);
                    aggregator.record(&failure);
                    failures.push(failure);
                }
            }
        }

        browser.close().await;

        let verdict = aggregator.finish();
        info!(status = %verdict.status, "check completed: {}", verdict.summary);

        RunSubmission {
            site_id: site.site_id,
            started_at,
            ended_at: Utc::now(),
            status: verdict.status,
            summary: Some(verdict.summary),
            page_results,
            failures,
            request_errors,
        }
    }

    #[instrument(skip(self, browser, page), fields(page_name = %page.name))]
    async fn execute_page(
        &self,
        browser: &dyn Browser,
        page: &PageConfig,
        url: &str,
    ) -> Result<PageOutcome, BrowserError> {
        debug!("executing page");

        let mut session = browser.new_session().await?;
        let mut events = session.subscribe();

        let visited = self.visit(session.as_mut(), url).await;
        session.close().await;
        let (final_url, timing) = visited?;

        let mut network = NetworkCollector::new();
        let mut console = ConsoleCollector::new();
        while let Ok(event) = events.try_recv() {
            network.observe(&event);
            console.observe(&event);
        }

        let perf = PerfCollector::derive(timing.as_ref());
        let result = PageResult {
            page_id: page.page_id,
            final_url,
            ttfb_ms: perf.ttfb_ms,
            dom_ms: perf.dom_ms,
            load_ms: perf.load_ms,
            requests_count: network.requests_count(),
            total_bytes: network.total_bytes(),
        };

        let (mut failures, mut request_errors) = network.into_parts();
        failures.extend(console.into_failures());
        for failure in &mut failures {
            failure.page_id = Some(page.page_id);
        }
        for request_error in &mut request_errors {
            request_error.page_id = Some(page.page_id);
        }

        Ok(PageOutcome {
            result,
            failures,
            request_errors,
        })
    }

    async fn visit(
        &self,
        session: &mut dyn PageSession,
        url: &str,
    ) -> Result<(String, Option<NavigationTiming>), BrowserError> {
        let timeout = self.options.navigation_timeout;
        let final_url = session.navigate(url, timeout).await?;
        session.wait_for_load(timeout).await?;
        Ok((final_url, session.timing().await))
    }
}
