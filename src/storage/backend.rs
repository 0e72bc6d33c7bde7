//! Run store trait definition
//!
//! This module defines the `RunStore` trait that all storage
//! implementations must implement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::model::{
    Failure, NewRun, PageResult, RequestError, Run, RunId, RunRecord, Site, SiteConfig, SiteId,
    Stamped,
};

use super::error::StorageResult;

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Trait for run storage backends
///
/// Sites are configuration and are written by the hub at startup. Runs are
/// written once, atomically with all of their children, and only ever read or
/// deleted afterwards.
///
/// ## Ranges
///
/// Every `*_in_range` method selects runs of one site whose start time lies
/// in `[from, to]` (both inclusive) and returns them ordered by start time,
/// oldest first. Child rows are stamped with their run's id and start time.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as they are shared between the
/// scheduler, the runner, ingestion and the HTTP handlers.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or replace a site and its pages
    async fn put_site(&self, site: Site) -> StorageResult<()>;

    async fn get_site(&self, site_id: SiteId) -> StorageResult<Option<Site>>;

    /// All sites, ordered by id
    async fn list_sites(&self) -> StorageResult<Vec<Site>>;

    async fn enabled_sites(&self) -> StorageResult<Vec<Site>> {
        let sites = self.list_sites().await?;
        Ok(sites.into_iter().filter(|site| site.enabled).collect())
    }

    /// Check configuration of a site (enabled pages only)
    async fn site_config(&self, site_id: SiteId) -> StorageResult<Option<SiteConfig>> {
        let site = self.get_site(site_id).await?;
        Ok(site.map(|site| site.check_config()))
    }

    /// Most recently started run of a site
    async fn latest_run(&self, site_id: SiteId) -> StorageResult<Option<Run>>;

    /// Persist a run with all of its children in one atomic operation
    ///
    /// Fails with `StorageError::NotFound` when the site does not exist; in
    /// that case nothing is written.
    async fn insert_run(&self, run: NewRun) -> StorageResult<Run>;

    async fn get_run(&self, run_id: RunId) -> StorageResult<Option<RunRecord>>;

    async fn runs_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Run>>;

    async fn failures_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Stamped<Failure>>>;

    async fn page_results_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Stamped<PageResult>>>;

    async fn request_errors_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Stamped<RequestError>>>;

    /// Delete runs started before `before`, children included
    ///
    /// Used for retention policy enforcement. Returns the number of runs deleted.
    async fn delete_runs_before(&self, before: DateTime<Utc>) -> StorageResult<usize>;

    /// Check backend health
    ///
    /// Performs a lightweight operation to verify the backend
    /// is operational (e.g., ping database).
    async fn health_check(&self) -> StorageResult<HealthStatus>;
}
