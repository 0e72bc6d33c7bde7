//! Run aggregation and the run status state machine
//!
//! ```text
//!            finish()  ┌─ SUCCESS  (no failures)
//! RUNNING ─────────────┼─ WARNING  (minor only)
//!    │                 └─ FAILED   (any critical or major)
//!    └──── abort() ────── ERROR    (run could not complete)
//! ```
//!
//! The aggregator is consumed by `finish`/`abort`, so a run is finalized once.

use crate::model::{Failure, RunStatus, SeverityCounts};

/// Derive the terminal status of a completed run from its severity tally
pub fn status_for(counts: &SeverityCounts) -> RunStatus {
    if counts.critical > 0 || counts.major > 0 {
        RunStatus::Failed
    } else if counts.minor > 0 {
        RunStatus::Warning
    } else {
        RunStatus::Success
    }
}

/// Final verdict for a run: status plus the tally it was derived from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunVerdict {
    pub status: RunStatus,
    pub counts: SeverityCounts,
    pub summary: String,
}

impl RunVerdict {
    /// Reconcile a submitted status with the submitted failures
    ///
    /// ERROR is kept as-is because it records that the run never completed.
    /// Every other status is recomputed from the tally. A missing summary is
    /// generated from `pages` and the tally.
    pub fn reconcile(
        submitted: RunStatus,
        failures: &[Failure],
        pages: usize,
        summary: Option<&str>,
    ) -> Self {
        let counts = SeverityCounts::tally(failures);
        let status = match submitted {
            RunStatus::Error => RunStatus::Error,
            _ => status_for(&counts),
        };

        Self {
            status,
            counts,
            summary: summary
                .map(str::to_string)
                .unwrap_or_else(|| summarize(pages, &counts)),
        }
    }
}

/// Accumulates failures while a run is in progress
#[derive(Debug, Default)]
pub struct RunAggregator {
    counts: SeverityCounts,
    pages: usize,
}

impl RunAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current (transient) status
    pub fn status(&self) -> RunStatus {
        RunStatus::Running
    }

    pub fn record(&mut self, failure: &Failure) {
        self.counts.add(failure.severity);
    }

    pub fn record_all<'a>(&mut self, failures: impl IntoIterator<Item = &'a Failure>) {
        for failure in failures {
            self.record(failure);
        }
    }

    /// Count a page that produced a result
    pub fn page_completed(&mut self) {
        self.pages += 1;
    }

    /// All pages processed
    pub fn finish(self) -> RunVerdict {
        RunVerdict {
            status: status_for(&self.counts),
            counts: self.counts,
            summary: summarize(self.pages, &self.counts),
        }
    }

    /// The run could not complete at all
    pub fn abort(self, reason: impl std::fmt::Display) -> RunVerdict {
        RunVerdict {
            status: RunStatus::Error,
            counts: self.counts,
            summary: format!("Fatal error: {reason}"),
        }
    }
}

fn summarize(pages: usize, counts: &SeverityCounts) -> String {
    format!(
        "Completed {} pages, {} critical, {} major, {} minor issues",
        pages, counts.critical, counts.major, counts.minor
    )
}
