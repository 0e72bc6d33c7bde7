//! Check execution with the HTTP engine against a mock site

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use synthetic_monitoring::{
    browser::http::HttpEngine,
    model::{FailureType, RunStatus, Severity, SiteConfig},
    monitors::{CheckExecutor, ExecutorOptions},
};
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

use crate::helpers::create_test_site;

const HOME: &str = r#"<!doctype html>
<html>
  <head>
    <link rel="stylesheet" href="/site.css">
    <script src="/app.js"></script>
  </head>
  <body><img src="/logo.png" alt="logo"></body>
</html>"#;

const LEGACY: &str = r#"<!doctype html>
<html>
  <head>
    <!-- <script src="/legacy.js"></script> -->
    <script>document.write('<img src="/pixel.gif">');</script>
  </head>
  <body>home</body>
</html>"#;

const PLAIN: &str = "<html><body>checkout</body></html>";

async fn mount(server: &MockServer, route: &str, response: ResponseTemplate) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(response)
        .mount(server)
        .await;
}

fn html(body: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_raw(body, "text/html")
}

fn site_on(server: &MockServer) -> SiteConfig {
    let mut site = create_test_site(1, None);
    site.base_url = server.uri();
    site.check_config()
}

fn executor(timeout: Duration) -> CheckExecutor {
    CheckExecutor::new(
        Arc::new(HttpEngine::new()),
        ExecutorOptions {
            navigation_timeout: timeout,
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn test_missing_assets_are_classified() {
    let server = MockServer::start().await;
    mount(&server, "/", html(HOME)).await;
    mount(&server, "/checkout", html(PLAIN)).await;
    mount(
        &server,
        "/site.css",
        ResponseTemplate::new(200).set_body_raw("body{}", "text/css"),
    )
    .await;
    mount(&server, "/app.js", ResponseTemplate::new(404)).await;
    mount(&server, "/logo.png", ResponseTemplate::new(404)).await;

    let site = site_on(&server);
    let run = executor(Duration::from_secs(5)).execute(&site).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.page_results.len(), 2);

    let home = &run.page_results[0];
    assert_eq!(home.page_id, 101);
    assert_eq!(home.requests_count, 4);
    assert!(home.ttfb_ms.is_some());
    assert!(home.load_ms.is_some());
    assert_eq!(run.page_results[1].requests_count, 1);

    let mut kinds: Vec<(FailureType, Severity)> = run
        .failures
        .iter()
        .map(|failure| (failure.failure_type, failure.severity))
        .collect();
    kinds.sort_by_key(|(kind, _)| kind.as_str());
    assert_eq!(
        kinds,
        vec![
            (FailureType::Img404, Severity::Major),
            (FailureType::Js404, Severity::Critical),
        ]
    );
    assert!(run.failures.iter().all(|f| f.page_id == Some(101)));

    assert_eq!(run.request_errors.len(), 2);
    assert!(run.request_errors.iter().all(|e| e.status == Some(404)));
    assert_eq!(
        run.summary.as_deref(),
        Some("Completed 2 pages, 1 critical, 1 major, 0 minor issues")
    );
}

#[tokio::test]
async fn test_slow_page_times_out() {
    let server = MockServer::start().await;
    mount(&server, "/", html(PLAIN)).await;
    mount(
        &server,
        "/checkout",
        html(PLAIN).set_delay(Duration::from_secs(3)),
    )
    .await;

    let site = site_on(&server);
    let run = executor(Duration::from_millis(300)).execute(&site).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.page_results.len(), 1);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].failure_type, FailureType::NavigationFailed);
    assert_eq!(run.failures[0].page_id, Some(102));
    assert_eq!(
        run.failures[0].url.as_deref(),
        Some(format!("{}/checkout", server.uri()).as_str())
    );
}

#[tokio::test]
async fn test_server_error_document() {
    let server = MockServer::start().await;
    mount(&server, "/", html(PLAIN)).await;
    mount(&server, "/checkout", ResponseTemplate::new(503)).await;

    let site = site_on(&server);
    let run = executor(Duration::from_secs(5)).execute(&site).await;

    assert_eq!(run.status, RunStatus::Failed);
    assert_eq!(run.page_results.len(), 2);
    assert_eq!(run.failures.len(), 1);
    assert_eq!(run.failures[0].failure_type, FailureType::Xhr5xx);
    assert_eq!(run.failures[0].severity, Severity::Critical);
    assert_eq!(run.request_errors[0].status, Some(503));
}

#[tokio::test]
async fn test_commented_out_assets_are_not_requested() {
    let server = MockServer::start().await;
    mount(&server, "/", html(LEGACY)).await;
    mount(&server, "/checkout", html(PLAIN)).await;
    for route in ["/legacy.js", "/pixel.gif"] {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(404))
            .expect(0)
            .mount(&server)
            .await;
    }

    let site = site_on(&server);
    let run = executor(Duration::from_secs(5)).execute(&site).await;

    assert_eq!(run.status, RunStatus::Success);
    assert!(run.failures.is_empty());
    assert!(run.request_errors.is_empty());
    assert_eq!(run.page_results[0].requests_count, 1);

    server.verify().await;
}
