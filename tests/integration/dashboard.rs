//! Dashboard queries over ingested runs

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use pretty_assertions::assert_eq;
use synthetic_monitoring::{
    dashboard::{Bucket, DashboardError, DashboardService, HealthLabel, TimeRange},
    ingest::IngestPipeline,
    model::{Failure, FailureType, RequestError, RunStatus, Severity, Site},
    storage::RunStore,
};

use crate::helpers::{
    SHOP_URL, create_bus, create_page_result, create_store, create_submission, create_test_site,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
}

fn missing_logo(page_id: i64) -> RequestError {
    RequestError {
        page_id: Some(page_id),
        resource_type: "image".to_string(),
        url: format!("{SHOP_URL}/logo.png"),
        status: Some(404),
        duration_ms: Some(12),
        error_message: Some("Not Found".to_string()),
    }
}

/// Three runs during the last day plus one in the week before the report week
///
/// | started      | outcome                     | load  |
/// |--------------|-----------------------------|-------|
/// | now - 10d    | clean                       | 3000  |
/// | now - 3h     | clean                       | 800   |
/// | now - 2h     | missing logo (MAJOR)        | 1200  |
/// | now - 30min  | clean                       | 800   |
async fn seeded() -> (Site, Arc<dyn RunStore>, DashboardService) {
    let site = create_test_site(1, None);
    let store = create_store(vec![site.clone()]).await;
    let ingest = IngestPipeline::new(store.clone(), create_bus());
    let home = site.pages[0].id;

    let mut old = create_submission(&site, now() - TimeDelta::days(10), vec![]);
    old.page_results = vec![create_page_result(home, 3000)];
    ingest.ingest(old).await.unwrap();

    ingest
        .ingest(create_submission(&site, now() - TimeDelta::hours(3), vec![]))
        .await
        .unwrap();

    let failure = Failure::new(Severity::Major, FailureType::Img404, "404 Not Found: image")
        .with_url(format!("{SHOP_URL}/logo.png"));
    let mut broken = create_submission(&site, now() - TimeDelta::hours(2), vec![failure]);
    broken.page_results = vec![create_page_result(home, 1200)];
    broken.request_errors = vec![missing_logo(home)];
    let receipt = ingest.ingest(broken).await.unwrap();
    assert_eq!(receipt.status, RunStatus::Failed);

    ingest
        .ingest(create_submission(
            &site,
            now() - TimeDelta::minutes(30),
            vec![],
        ))
        .await
        .unwrap();

    let dashboard = DashboardService::new(store.clone());
    (site, store, dashboard)
}

#[tokio::test]
async fn test_overview_over_last_day() {
    let (site, _, dashboard) = seeded().await;

    let overview = dashboard
        .overview(site.id, TimeRange::LastDay, now())
        .await
        .unwrap();

    assert_eq!(overview.site_name, "Shop 1");
    assert_eq!(overview.status, HealthLabel::Healthy);
    assert_eq!(overview.uptime_percent, 66.67);
    assert_eq!(overview.issues_by_severity["CRITICAL"], 0);
    assert_eq!(overview.issues_by_severity["MAJOR"], 1);
    assert_eq!(overview.issues_by_severity["MINOR"], 0);
    assert_eq!(overview.performance.p50_load_ms, Some(800));
    assert_eq!(overview.performance.p95_load_ms, Some(1200));
    assert_eq!(
        overview.last_run.map(|run| run.started_at),
        Some(now() - TimeDelta::minutes(30))
    );
}

#[tokio::test]
async fn test_overview_of_empty_range() {
    let (site, _, dashboard) = seeded().await;

    // Nothing ran between five and four hours ago
    let overview = dashboard
        .overview(site.id, TimeRange::LastHour, now() - TimeDelta::hours(4))
        .await
        .unwrap();

    assert_eq!(overview.uptime_percent, 100.0);
    assert_eq!(overview.performance.p95_load_ms, None);
    assert_eq!(overview.issues_by_severity.values().sum::<u32>(), 0);
}

#[tokio::test]
async fn test_error_series_hourly() {
    let (site, _, dashboard) = seeded().await;

    let series = dashboard
        .error_series(site.id, TimeRange::LastDay, Bucket::Hour, now())
        .await
        .unwrap();

    assert_eq!(series.label, "Errors");
    let points: Vec<(DateTime<Utc>, f64)> = series
        .data_points
        .iter()
        .map(|point| (point.timestamp, point.value))
        .collect();
    assert_eq!(
        points,
        vec![
            (Utc.with_ymd_and_hms(2026, 3, 10, 9, 0, 0).unwrap(), 0.0),
            (Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap(), 1.0),
            (Utc.with_ymd_and_hms(2026, 3, 10, 11, 0, 0).unwrap(), 0.0),
        ]
    );
}

#[tokio::test]
async fn test_performance_series_daily_mean() {
    let (site, _, dashboard) = seeded().await;

    let series = dashboard
        .performance_series(site.id, TimeRange::LastDay, Bucket::Day, now())
        .await
        .unwrap();

    assert_eq!(series.label, "Load Time");
    assert_eq!(series.data_points.len(), 1);
    assert_eq!(series.data_points[0].count, 3);
    assert_eq!(series.data_points[0].value, 933.33);
}

#[tokio::test]
async fn test_runs_carry_failures_with_page_names() {
    let (site, _, dashboard) = seeded().await;

    let runs = dashboard
        .runs(site.id, now() - TimeDelta::days(1), now())
        .await
        .unwrap();

    assert_eq!(runs.len(), 3);
    assert!(runs.windows(2).all(|w| w[0].run.started_at <= w[1].run.started_at));

    let broken = &runs[1];
    assert_eq!(broken.run.status, RunStatus::Failed);
    assert_eq!(broken.failures.len(), 1);
    assert_eq!(broken.failures[0].page_name.as_deref(), Some("Home"));
    assert!(runs[0].failures.is_empty());
}

#[tokio::test]
async fn test_weekly_report() {
    let (site, _, dashboard) = seeded().await;

    let report = dashboard.weekly_report(site.id, now()).await.unwrap();

    assert_eq!(report.week_start.to_string(), "2026-03-03");
    assert_eq!(report.week_end.to_string(), "2026-03-10");
    assert_eq!(report.uptime_percent, 66.67);
    assert_eq!(report.failures_by_severity["MAJOR"], 1);
    assert_eq!(report.performance.p95_load_ms, Some(1200));
    assert_eq!(report.previous_week_performance.p95_load_ms, Some(3000));

    assert_eq!(report.top_issues.len(), 1);
    assert_eq!(report.top_issues[0].failure_type, FailureType::Img404);

    assert_eq!(report.slowest_pages.len(), 1);
    assert_eq!(report.slowest_pages[0].page_name, "Home");
    assert_eq!(report.slowest_pages[0].avg_load_ms, 933.33);

    assert_eq!(report.top_404_assets.len(), 1);
    assert_eq!(report.top_404_assets[0].url, format!("{SHOP_URL}/logo.png"));
    assert_eq!(report.top_404_assets[0].count, 1);
}

#[tokio::test]
async fn test_unknown_site_and_run() {
    let (_, _, dashboard) = seeded().await;

    assert_matches!(
        dashboard.overview(99, TimeRange::LastDay, now()).await,
        Err(DashboardError::SiteNotFound(99))
    );
    assert_matches!(
        dashboard.weekly_report(99, now()).await,
        Err(DashboardError::SiteNotFound(99))
    );
    assert_matches!(dashboard.run(12345).await, Err(DashboardError::RunNotFound(12345)));
}

#[tokio::test]
async fn test_run_details() {
    let (site, store, dashboard) = seeded().await;

    let latest = store.latest_run(site.id).await.unwrap().unwrap();
    let record = dashboard.run(latest.id).await.unwrap();

    assert_eq!(record.run, latest);
    assert_eq!(record.page_results.len(), 1);
}
