//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use synthetic_monitoring::{
    live::LiveEventBus,
    model::{Failure, Page, PageResult, RunStatus, RunSubmission, Site},
    storage::{MemoryStore, RunStore},
};

pub const SHOP_URL: &str = "https://shop.test";

pub fn create_test_site(id: i64, frequency_seconds: Option<u64>) -> Site {
    Site {
        id,
        name: format!("Shop {id}"),
        base_url: SHOP_URL.to_string(),
        enabled: true,
        frequency_seconds,
        alert_recipients: vec![],
        pages: vec![
            Page {
                id: id * 100 + 1,
                name: "Home".to_string(),
                path: "/".to_string(),
                enabled: true,
            },
            Page {
                id: id * 100 + 2,
                name: "Checkout".to_string(),
                path: "/checkout".to_string(),
                enabled: true,
            },
        ],
    }
}

pub fn create_page_result(page_id: i64, load_ms: u32) -> PageResult {
    PageResult {
        page_id,
        final_url: format!("{SHOP_URL}/"),
        ttfb_ms: Some(load_ms / 4),
        dom_ms: Some(load_ms / 2),
        load_ms: Some(load_ms),
        requests_count: 5,
        total_bytes: 10_240,
    }
}

/// A submission for the first page of `site`, claiming SUCCESS
pub fn create_submission(
    site: &Site,
    started_at: DateTime<Utc>,
    failures: Vec<Failure>,
) -> RunSubmission {
    let page_id = site.pages[0].id;
    RunSubmission {
        site_id: site.id,
        started_at,
        ended_at: started_at + chrono::Duration::seconds(3),
        status: RunStatus::Success,
        summary: None,
        page_results: vec![create_page_result(page_id, 800)],
        failures: failures
            .into_iter()
            .map(|failure| failure.on_page(page_id))
            .collect(),
        request_errors: vec![],
    }
}

/// Memory store seeded with the given sites
pub async fn create_store(sites: Vec<Site>) -> Arc<dyn RunStore> {
    let store = Arc::new(MemoryStore::new());
    for site in sites {
        store.put_site(site).await.unwrap();
    }
    store
}

pub fn create_bus() -> LiveEventBus {
    LiveEventBus::new(Duration::from_secs(60))
}
