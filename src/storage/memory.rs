//! In-memory run store (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Running the hub without a storage backend configured
//!
//! ## Limitations
//!
//! - **No persistence**: All data lost on restart
//! - **Linear scans**: Range queries walk every run of the store

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::model::{
    Failure, NewRun, PageResult, RequestError, Run, RunId, RunRecord, Site, SiteId, Stamped,
};

use super::backend::{HealthStatus, RunStore};
use super::error::{StorageError, StorageResult};

#[derive(Debug, Default)]
struct MemoryState {
    sites: BTreeMap<SiteId, Site>,
    runs: BTreeMap<RunId, RunRecord>,
    last_run_id: RunId,
}

impl MemoryState {
    /// Runs of one site within the range, oldest first
    fn runs_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Vec<&RunRecord> {
        let mut runs: Vec<&RunRecord> = self
            .runs
            .values()
            .filter(|record| {
                record.run.site_id == site_id
                    && record.run.started_at >= from
                    && record.run.started_at <= to
            })
            .collect();
        runs.sort_by_key(|record| (record.run.started_at, record.run.id));
        runs
    }

    fn stamped<T: Clone>(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        children: impl Fn(&RunRecord) -> &[T],
    ) -> Vec<Stamped<T>> {
        self.runs_in_range(site_id, from, to)
            .into_iter()
            .flat_map(|record| {
                children(record).iter().map(move |item| Stamped {
                    run_id: record.run.id,
                    recorded_at: record.run.started_at,
                    item: item.clone(),
                })
            })
            .collect()
    }
}

/// In-memory run store
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn put_site(&self, site: Site) -> StorageResult<()> {
        debug!("storing site {} ({})", site.id, site.name);
        self.state.write().await.sites.insert(site.id, site);
        Ok(())
    }

    async fn get_site(&self, site_id: SiteId) -> StorageResult<Option<Site>> {
        Ok(self.state.read().await.sites.get(&site_id).cloned())
    }

    async fn list_sites(&self) -> StorageResult<Vec<Site>> {
        Ok(self.state.read().await.sites.values().cloned().collect())
    }

    async fn latest_run(&self, site_id: SiteId) -> StorageResult<Option<Run>> {
        let state = self.state.read().await;
        let latest = state
            .runs
            .values()
            .filter(|record| record.run.site_id == site_id)
            .max_by_key(|record| (record.run.started_at, record.run.id))
            .map(|record| record.run.clone());
        Ok(latest)
    }

    async fn insert_run(&self, new_run: NewRun) -> StorageResult<Run> {
        let mut state = self.state.write().await;

        if !state.sites.contains_key(&new_run.site_id) {
            return Err(StorageError::NotFound(format!("site {}", new_run.site_id)));
        }

        state.last_run_id += 1;
        let run = Run {
            id: state.last_run_id,
            site_id: new_run.site_id,
            started_at: new_run.started_at,
            ended_at: new_run.ended_at,
            status: new_run.status,
            critical_count: new_run.counts.critical,
            major_count: new_run.counts.major,
            minor_count: new_run.counts.minor,
            summary: new_run.summary,
        };

        state.runs.insert(
            run.id,
            RunRecord {
                run: run.clone(),
                page_results: new_run.page_results,
                failures: new_run.failures,
                request_errors: new_run.request_errors,
            },
        );

        debug!("stored run {} for site {}", run.id, run.site_id);
        Ok(run)
    }

    async fn get_run(&self, run_id: RunId) -> StorageResult<Option<RunRecord>> {
        Ok(self.state.read().await.runs.get(&run_id).cloned())
    }

    async fn runs_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Run>> {
        let state = self.state.read().await;
        Ok(state
            .runs_in_range(site_id, from, to)
            .into_iter()
            .map(|record| record.run.clone())
            .collect())
    }

    async fn failures_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Stamped<Failure>>> {
        let state = self.state.read().await;
        Ok(state.stamped(site_id, from, to, |record| record.failures.as_slice()))
    }

    async fn page_results_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Stamped<PageResult>>> {
        let state = self.state.read().await;
        Ok(state.stamped(site_id, from, to, |record| record.page_results.as_slice()))
    }

    async fn request_errors_in_range(
        &self,
        site_id: SiteId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<Stamped<RequestError>>> {
        let state = self.state.read().await;
        Ok(state.stamped(site_id, from, to, |record| record.request_errors.as_slice()))
    }

    async fn delete_runs_before(&self, before: DateTime<Utc>) -> StorageResult<usize> {
        let mut state = self.state.write().await;
        let count = state.runs.len();
        state.runs.retain(|_, record| record.run.started_at >= before);
        let deleted = count - state.runs.len();
        debug!("deleted {deleted} runs older than {before}");
        Ok(deleted)
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let state = self.state.read().await;
        Ok(HealthStatus {
            healthy: true,
            message: "In-memory storage operational".to_string(),
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("sites".to_string(), state.sites.len().to_string()),
                ("runs".to_string(), state.runs.len().to_string()),
            ]),
        })
    }
}
