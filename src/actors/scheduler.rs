//! SchedulerActor - Decides which sites are due for a run
//!
//! ## Message Flow
//!
//! ```text
//! Timer tick → enabled sites → latest run per site → is_due? → TriggerSink
//!     ↑
//!     └─── Commands (TickNow, Shutdown)
//! ```
//!
//! The scheduler never executes checks itself. A site whose evaluation fails
//! is logged and skipped; the next tick starts from scratch.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, instrument, trace, warn};

use crate::model::Site;
use crate::storage::RunStore;

use super::messages::{SchedulerCommand, TickReport, TriggerMessage, TriggerSource};

/// Whether a site is due for a new run
///
/// A site without any run is always due. Otherwise it is due once at least
/// `frequency_secs` have elapsed since its latest run started.
pub fn is_due(now: DateTime<Utc>, last_started: Option<DateTime<Utc>>, frequency_secs: u64) -> bool {
    let Some(last_started) = last_started else {
        return true;
    };

    let cutoff = i64::try_from(frequency_secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|frequency| now.checked_sub_signed(frequency));

    match cutoff {
        Some(cutoff) => last_started <= cutoff,
        None => false,
    }
}

/// Destination for trigger messages
#[async_trait]
pub trait TriggerSink: Send + Sync {
    async fn send(&self, trigger: TriggerMessage) -> Result<()>;
}

/// Bounded in-process message channel between trigger producers and the runner
///
/// Sending never waits: a full channel rejects the trigger, and a scheduled
/// site simply stays due until the next tick.
#[derive(Debug, Clone)]
pub struct TriggerChannel {
    sender: mpsc::Sender<TriggerMessage>,
}

impl TriggerChannel {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TriggerMessage>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl TriggerSink for TriggerChannel {
    async fn send(&self, trigger: TriggerMessage) -> Result<()> {
        match self.sender.try_send(trigger) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(trigger)) => {
                anyhow::bail!("trigger channel full, dropped trigger for site {}", trigger.site_id)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => anyhow::bail!("trigger channel closed"),
        }
    }
}

/// Scheduler settings
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Time between two evaluations
    pub tick: Duration,

    /// Frequency for sites without their own
    pub default_frequency_secs: u64,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(60),
            default_frequency_secs: 300,
        }
    }
}

/// Actor evaluating due sites on a fixed tick
pub struct SchedulerActor {
    store: Arc<dyn RunStore>,
    sink: Arc<dyn TriggerSink>,
    options: SchedulerOptions,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl SchedulerActor {
    pub fn new(
        store: Arc<dyn RunStore>,
        sink: Arc<dyn TriggerSink>,
        options: SchedulerOptions,
        command_rx: mpsc::Receiver<SchedulerCommand>,
    ) -> Self {
        Self {
            store,
            sink,
            options,
            command_rx,
        }
    }

    #[instrument(skip(self), fields(tick_secs = self.options.tick.as_secs()))]
    pub async fn run(mut self) {
        debug!("starting scheduler actor");

        let mut ticker = interval_at(Instant::now() + self.options.tick, self.options.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick(Utc::now()).await {
                        Ok(report) => trace!(
                            "tick done: {} evaluated, {} triggered, {} failed",
                            report.evaluated, report.triggered, report.failed
                        ),
                        Err(e) => error!("scheduler tick failed: {:#}", e),
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::TickNow { respond_to } => {
                            debug!("received TickNow command");
                            let result = self.tick(Utc::now()).await;
                            let _ = respond_to.send(result);
                        }

                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("scheduler actor stopped");
    }

    /// Evaluate every enabled site once
    async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        let sites = self
            .store
            .enabled_sites()
            .await
            .context("failed to list enabled sites")?;

        let mut report = TickReport {
            evaluated: sites.len(),
            ..Default::default()
        };

        for site in &sites {
            match self.evaluate(site, now).await {
                Ok(true) => report.triggered += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(site_id = site.id, "failed to evaluate site: {:#}", e);
                    report.failed += 1;
                }
            }
        }

        if report.triggered > 0 {
            debug!("triggered {} of {} sites", report.triggered, report.evaluated);
        }

        Ok(report)
    }

    async fn evaluate(&self, site: &Site, now: DateTime<Utc>) -> Result<bool> {
        let latest = self
            .store
            .latest_run(site.id)
            .await
            .context("failed to fetch latest run")?;

        let frequency = site
            .frequency_seconds
            .unwrap_or(self.options.default_frequency_secs);

        if !is_due(now, latest.map(|run| run.started_at), frequency) {
            return Ok(false);
        }

        trace!(site_id = site.id, "site is due");
        self.sink
            .send(TriggerMessage::for_site(site, TriggerSource::Scheduled))
            .await?;
        Ok(true)
    }
}

/// Handle for controlling a SchedulerActor
#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    pub fn spawn(
        store: Arc<dyn RunStore>,
        sink: Arc<dyn TriggerSink>,
        options: SchedulerOptions,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = SchedulerActor::new(store, sink, options, cmd_rx);
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    /// Evaluate all sites now and report what happened
    pub async fn tick_now(&self) -> Result<TickReport> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(SchedulerCommand::TickNow { respond_to: tx })
            .await
            .context("failed to send TickNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(SchedulerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
