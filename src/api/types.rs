//! API request and response types
//!
//! Dashboard payloads come straight from [`crate::dashboard`]; the types here
//! cover the endpoints that only exist over HTTP.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actors::messages::TriggerSource;
use crate::dashboard::LastRun;
use crate::model::{Site, SiteId};

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: StorageHealth,
    /// Live subscribers currently connected
    pub live_subscribers: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageHealth {
    pub healthy: bool,
    pub message: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// One entry of the site list
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteInfo {
    pub id: SiteId,
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
    pub frequency_seconds: Option<u64>,
    pub enabled_pages: usize,
    pub last_run: Option<LastRun>,
}

impl SiteInfo {
    pub fn new(site: &Site, last_run: Option<LastRun>) -> Self {
        Self {
            id: site.id,
            name: site.name.clone(),
            base_url: site.base_url.clone(),
            enabled: site.enabled,
            frequency_seconds: site.frequency_seconds,
            enabled_pages: site.enabled_pages().count(),
            last_run,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SitesResponse {
    pub sites: Vec<SiteInfo>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerResponse {
    pub site_id: SiteId,
    pub triggered_by: TriggerSource,
    pub queued_at: DateTime<Utc>,
}

// ============================================================================
// Query parameters
// ============================================================================

/// `?range=` for windowed queries
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub range: Option<String>,
}

/// `?range=&bucket=` for time series
#[derive(Debug, Default, Deserialize)]
pub struct SeriesQuery {
    pub range: Option<String>,
    pub bucket: Option<String>,
}

/// `?from=&to=` for run listings, RFC 3339
#[derive(Debug, Default, Deserialize)]
pub struct RunsQuery {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// `?siteId=` for the event stream
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventsQuery {
    pub site_id: SiteId,
}
