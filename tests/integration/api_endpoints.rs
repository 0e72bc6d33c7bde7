//! Integration tests for API endpoints
//!
//! These tests verify that:
//! - All REST endpoints return correct responses
//! - Authentication middleware functions properly
//! - Ingestion validates and rejects bad submissions with 422
//! - The SSE stream delivers the connect acknowledgement and run completions
//! - Error handling is correct

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use chrono::Utc;
use pretty_assertions::assert_eq;
use serde_json::Value;
use synthetic_monitoring::{
    actors::{messages::TriggerMessage, scheduler::TriggerChannel},
    api::{ApiConfig, ApiState, spawn_api_server},
    model::{Failure, FailureType, Severity, Site},
};
use tokio::sync::mpsc;

use crate::helpers::{create_bus, create_store, create_submission, create_test_site};

const TOKEN: &str = "test-token";

struct TestApi {
    addr: SocketAddr,
    client: reqwest::Client,
    // Keeps the trigger channel open
    triggers: mpsc::Receiver<TriggerMessage>,
}

impl TestApi {
    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(TOKEN)
            .send()
            .await
            .unwrap()
    }

    async fn get_json(&self, path: &str) -> (StatusCode, Value) {
        let response = self.get(path).await;
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }

    async fn post_json(&self, path: &str, body: &impl serde::Serialize) -> (StatusCode, Value) {
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(TOKEN)
            .json(body)
            .send()
            .await
            .unwrap();
        let status = StatusCode::from_u16(response.status().as_u16()).unwrap();
        (status, response.json().await.unwrap())
    }
}

// Helper to create test API server
async fn spawn_test_api(sites: Vec<Site>, trigger_capacity: usize) -> TestApi {
    let store = create_store(sites).await;
    let (triggers, trigger_rx) = TriggerChannel::new(trigger_capacity);
    let state = ApiState::new(store, create_bus(), Arc::new(triggers));

    let config = ApiConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)), // Random port
        auth_token: Some(TOKEN.to_string()),
        enable_cors: true,
    };

    TestApi {
        addr: spawn_api_server(config, state).await.unwrap(),
        client: reqwest::Client::new(),
        triggers: trigger_rx,
    }
}

#[tokio::test]
async fn test_health_is_open() {
    let api = spawn_test_api(vec![], 4).await;

    let response = reqwest::get(api.url("/api/v1/health")).await.unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["storage"]["healthy"], true);
    assert_eq!(body["live_subscribers"], 0);
}

#[tokio::test]
async fn test_auth_required() {
    let api = spawn_test_api(vec![create_test_site(1, None)], 4).await;

    let response = api
        .client
        .get(api.url("/api/v1/sites"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());

    let response = api
        .client
        .get(api.url("/api/v1/sites"))
        .bearer_auth("wrong-token")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let response = api
        .client
        .get(api.url("/api/v1/sites"))
        .header("Authorization", "Basic dXNlcjpwYXNz")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);

    // Query token for EventSource clients
    let response = api
        .client
        .get(api.url(&format!("/api/v1/sites?access_token={TOKEN}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn test_list_sites_and_config() {
    let mut disabled = create_test_site(2, Some(60));
    disabled.enabled = false;
    disabled.pages[1].enabled = false;
    let api = spawn_test_api(vec![create_test_site(1, None), disabled], 4).await;

    let (status, body) = api.get_json("/api/v1/sites").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 2);
    assert_eq!(body["sites"][0]["id"], 1);
    assert_eq!(body["sites"][0]["enabledPages"], 2);
    assert_eq!(body["sites"][0]["lastRun"], Value::Null);
    assert_eq!(body["sites"][1]["enabled"], false);
    assert_eq!(body["sites"][1]["frequencySeconds"], 60);

    let (status, body) = api.get_json("/api/v1/sites/2/config").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["siteId"], 2);
    assert_eq!(body["pages"].as_array().unwrap().len(), 1);
    assert_eq!(body["pages"][0]["path"], "/");

    let (status, body) = api.get_json("/api/v1/sites/99/config").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("99"));
}

#[tokio::test]
async fn test_manual_trigger() {
    let mut api = spawn_test_api(vec![create_test_site(1, None)], 1).await;

    let (status, body) = api
        .post_json("/api/v1/sites/1/trigger", &serde_json::json!({}))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["siteId"], 1);
    assert_eq!(body["triggeredBy"], "MANUAL");

    let trigger = api.triggers.recv().await.unwrap();
    assert_eq!(trigger.site_id, 1);

    // Fill the single slot, the next trigger is rejected
    api.post_json("/api/v1/sites/1/trigger", &serde_json::json!({}))
        .await;
    let (status, body) = api
        .post_json("/api/v1/sites/1/trigger", &serde_json::json!({}))
        .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());

    let (status, _) = api
        .post_json("/api/v1/sites/99/trigger", &serde_json::json!({}))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_ingest_and_read_back() {
    let site = create_test_site(1, None);
    let api = spawn_test_api(vec![site.clone()], 4).await;

    let failure = Failure::new(Severity::Critical, FailureType::Css404, "404 Not Found: stylesheet")
        .with_url("https://shop.test/app.css");
    let submission = create_submission(&site, Utc::now(), vec![failure]);

    let (status, receipt) = api.post_json("/api/v1/ingest/runs", &submission).await;
    assert_eq!(status, StatusCode::CREATED);
    // Claimed SUCCESS, stored as FAILED
    assert_eq!(receipt["status"], "FAILED");
    let run_id = receipt["runId"].as_i64().unwrap();

    let (status, run) = api.get_json(&format!("/api/v1/runs/{run_id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(run["run"]["criticalCount"], 1);
    assert_eq!(run["failures"][0]["type"], "CSS_404");
    assert_eq!(run["pageResults"].as_array().unwrap().len(), 1);

    let (status, runs) = api.get_json("/api/v1/sites/1/runs").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(runs.as_array().unwrap().len(), 1);
    assert_eq!(runs[0]["id"], run_id);
    assert_eq!(runs[0]["failures"][0]["pageName"], "Home");

    let (status, overview) = api.get_json("/api/v1/sites/1/overview?range=1h").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["range"], "1h");
    assert_eq!(overview["status"], "DOWN");
    assert_eq!(overview["uptimePercent"], 0.0);
    assert_eq!(overview["issuesBySeverity"]["CRITICAL"], 1);
    assert_eq!(overview["lastRun"]["runId"], run_id);

    let (status, series) = api
        .get_json("/api/v1/sites/1/timeseries/errors?range=6h&bucket=5m")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(series["label"], "Errors");
    assert_eq!(series["dataPoints"][0]["value"], 1.0);

    let (status, series) = api
        .get_json("/api/v1/sites/1/timeseries/performance")
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(series["dataPoints"][0]["value"], 800.0);

    let (status, report) = api.get_json("/api/v1/sites/1/report").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["siteName"], "Shop 1");
    assert_eq!(report["topIssues"][0]["type"], "CSS_404");
}

#[tokio::test]
async fn test_ingest_rejects_invalid_submissions() {
    let site = create_test_site(1, None);
    let api = spawn_test_api(vec![site.clone()], 4).await;

    let mut unknown_site = create_submission(&site, Utc::now(), vec![]);
    unknown_site.site_id = 42;
    let (status, body) = api.post_json("/api/v1/ingest/runs", &unknown_site).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("site not found"));

    let mut unknown_page = create_submission(&site, Utc::now(), vec![]);
    unknown_page.page_results[0].page_id = 999;
    let (status, _) = api.post_json("/api/v1/ingest/runs", &unknown_page).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let mut backwards = create_submission(&site, Utc::now(), vec![]);
    backwards.ended_at = backwards.started_at - chrono::Duration::seconds(1);
    let (status, _) = api.post_json("/api/v1/ingest/runs", &backwards).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Nothing was stored
    let (_, runs) = api.get_json("/api/v1/sites/1/runs").await;
    assert_eq!(runs.as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_not_found_and_bad_requests() {
    let api = spawn_test_api(vec![create_test_site(1, None)], 4).await;

    for path in [
        "/api/v1/sites/99/overview",
        "/api/v1/sites/99/timeseries/errors",
        "/api/v1/sites/99/runs",
        "/api/v1/sites/99/report",
        "/api/v1/runs/12345",
    ] {
        let (status, body) = api.get_json(path).await;
        assert_eq!(status, StatusCode::NOT_FOUND, "{path}");
        assert!(body["error"].is_string(), "{path}");
    }

    let (status, _) = api
        .get_json("/api/v1/sites/1/runs?from=2026-03-10T12:00:00Z&to=2026-03-09T12:00:00Z")
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Unknown range labels fall back to 24h
    let (status, overview) = api.get_json("/api/v1/sites/1/overview?range=2y").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["range"], "24h");
    assert_eq!(overview["status"], "UNKNOWN");
    assert_eq!(overview["uptimePercent"], 100.0);
}

/// Read the stream until a complete event named `name` arrived, return its data
async fn read_event(response: &mut reqwest::Response, buffer: &mut String, name: &str) -> String {
    let marker = format!("event: {name}\n");
    let read = async {
        loop {
            if let Some(start) = buffer.find(&marker)
                && let Some(len) = buffer[start..].find("\n\n")
            {
                let block = buffer[start..start + len].to_string();
                buffer.replace_range(..start + len + 2, "");
                return block
                    .lines()
                    .find_map(|line| line.strip_prefix("data: "))
                    .unwrap_or_default()
                    .to_string();
            }

            let chunk = response.chunk().await.unwrap().expect("stream ended");
            buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    };

    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .unwrap_or_else(|_| panic!("no '{name}' event in stream"))
}

#[tokio::test]
async fn test_event_stream() {
    let site = create_test_site(1, None);
    let api = spawn_test_api(vec![site.clone()], 4).await;

    let (status, _) = api.get_json("/api/v1/events?siteId=99").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let mut response = api
        .client
        .get(api.url(&format!("/api/v1/events?siteId=1&access_token={TOKEN}")))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream")
    );

    let mut buffer = String::new();
    let data = read_event(&mut response, &mut buffer, "connected").await;
    assert_eq!(data, "Connected to monitoring events");

    let (status, health) = api.get_json("/api/v1/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["live_subscribers"], 1);

    let (status, receipt) = api
        .post_json(
            "/api/v1/ingest/runs",
            &create_submission(&site, Utc::now(), vec![]),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let data = read_event(&mut response, &mut buffer, "run_completed").await;
    let event: Value = serde_json::from_str(&data).unwrap();
    assert_eq!(event["runId"], receipt["runId"]);
    assert_eq!(event["status"], "SUCCESS");
    assert_eq!(event["critical"], 0);
}
