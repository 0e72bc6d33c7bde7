//! Run ingestion
//!
//! Validates a submitted run against the site configuration, persists it with
//! all of its children in one store call and notifies live subscribers.
//! Validation happens before anything is written: a rejected submission
//! leaves no trace and publishes nothing.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::actors::runner::RunSink;
use crate::aggregator::RunVerdict;
use crate::live::LiveEventBus;
use crate::model::{NewRun, PageId, RunId, RunStatus, RunSubmission, Site, SiteId};
use crate::storage::{RunStore, StorageError};

/// Errors raised while ingesting a run
#[derive(Debug)]
pub enum IngestError {
    /// The run references a site that does not exist
    SiteNotFound(SiteId),

    /// A page result, failure or request error references a page outside the site
    PageNotFound { site_id: SiteId, page_id: PageId },

    /// The submission is inconsistent on its own
    Invalid(String),

    Storage(StorageError),
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IngestError::SiteNotFound(site_id) => write!(f, "site not found: {site_id}"),
            IngestError::PageNotFound { site_id, page_id } => {
                write!(f, "page not found: {page_id} (site {site_id})")
            }
            IngestError::Invalid(msg) => write!(f, "invalid run submission: {msg}"),
            IngestError::Storage(err) => write!(f, "failed to store run: {err}"),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for IngestError {
    fn from(err: StorageError) -> Self {
        IngestError::Storage(err)
    }
}

/// Result of a successful ingestion
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReceipt {
    pub run_id: RunId,
    pub status: RunStatus,
}

#[derive(Clone)]
pub struct IngestPipeline {
    store: Arc<dyn RunStore>,
    bus: LiveEventBus,
}

impl IngestPipeline {
    pub fn new(store: Arc<dyn RunStore>, bus: LiveEventBus) -> Self {
        Self { store, bus }
    }

    #[instrument(skip_all, fields(site_id = submission.site_id))]
    pub async fn ingest(&self, submission: RunSubmission) -> Result<IngestReceipt, IngestError> {
        let site = self
            .store
            .get_site(submission.site_id)
            .await?
            .ok_or(IngestError::SiteNotFound(submission.site_id))?;

        validate(&site, &submission)?;

        let verdict = RunVerdict::reconcile(
            submission.status,
            &submission.failures,
            submission.page_results.len(),
            submission.summary.as_deref(),
        );
        if verdict.status != submission.status {
            warn!(
                "submitted status {} contradicts failures, storing {}",
                submission.status, verdict.status
            );
        }

        let new_run = NewRun {
            site_id: submission.site_id,
            started_at: submission.started_at,
            ended_at: submission.ended_at,
            status: verdict.status,
            counts: verdict.counts,
            summary: Some(verdict.summary),
            page_results: submission.page_results,
            failures: submission.failures,
            request_errors: submission.request_errors,
        };

        let run = self.store.insert_run(new_run).await.map_err(|e| match e {
            StorageError::NotFound(_) => IngestError::SiteNotFound(site.id),
            other => IngestError::Storage(other),
        })?;

        let notified = self.bus.publish(&run);
        info!(
            run_id = run.id,
            status = %run.status,
            "run ingested, notified {notified} live subscribers"
        );

        Ok(IngestReceipt {
            run_id: run.id,
            status: run.status,
        })
    }
}

fn validate(site: &Site, submission: &RunSubmission) -> Result<(), IngestError> {
    if submission.ended_at < submission.started_at {
        return Err(IngestError::Invalid(
            "endedAt is before startedAt".to_string(),
        ));
    }

    let referenced = submission
        .page_results
        .iter()
        .map(|result| Some(result.page_id))
        .chain(submission.failures.iter().map(|failure| failure.page_id))
        .chain(submission.request_errors.iter().map(|error| error.page_id))
        .flatten();

    for page_id in referenced {
        if site.page(page_id).is_none() {
            return Err(IngestError::PageNotFound {
                site_id: site.id,
                page_id,
            });
        }
    }

    Ok(())
}

#[async_trait]
impl RunSink for IngestPipeline {
    async fn submit(&self, run: RunSubmission) -> Result<()> {
        self.ingest(run).await?;
        Ok(())
    }
}
