//! Message types for actor communication
//!
//! ## Design Principles
//!
//! 1. **Commands**: Request/response messages sent to specific actors via mpsc
//! 2. **Triggers**: Work items handed from producers (scheduler, API) to the runner
//! 3. **Duplicates are fine**: a trigger delivered twice produces two valid runs

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::model::{Site, SiteId};

/// Who asked for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TriggerSource {
    Scheduled,
    Manual,
}

/// Request to run a check for one site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerMessage {
    pub site_id: SiteId,
    pub site_name: String,
    pub base_url: String,
    pub triggered_by: TriggerSource,
}

impl TriggerMessage {
    pub fn for_site(site: &Site, triggered_by: TriggerSource) -> Self {
        Self {
            site_id: site.id,
            site_name: site.name.clone(),
            base_url: site.base_url.clone(),
            triggered_by,
        }
    }
}

/// Commands that can be sent to the SchedulerActor
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Evaluate all sites immediately (bypassing the tick timer)
    TickNow {
        respond_to: oneshot::Sender<anyhow::Result<TickReport>>,
    },

    /// Gracefully shut down the scheduler
    Shutdown,
}

/// Outcome of one scheduler tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Enabled sites looked at
    pub evaluated: usize,

    /// Triggers emitted
    pub triggered: usize,

    /// Sites whose evaluation or trigger emission failed
    pub failed: usize,
}

/// Commands that can be sent to the RunnerActor
#[derive(Debug)]
pub enum RunnerCommand {
    GetStats {
        respond_to: oneshot::Sender<RunnerStats>,
    },

    /// Stop accepting triggers; runs in flight complete in the background
    Shutdown,
}

/// Runner counters since startup
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunnerStats {
    /// Triggers taken off the channel
    pub received: u64,

    /// Triggers dropped because the site is unknown or has no enabled pages
    pub skipped: u64,

    /// Runs executed and accepted by the sink
    pub completed: u64,

    /// Runs executed but rejected by the sink, or whose lookup failed
    pub failed: u64,

    /// Runs currently executing
    pub in_flight: u64,
}

/// Commands that can be sent to the RetentionActor
#[derive(Debug)]
pub enum RetentionCommand {
    /// Run a cleanup pass now, responding with the number of runs deleted
    CleanupNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },

    Shutdown,
}
