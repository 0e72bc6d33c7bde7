//! RetentionActor - Deletes runs older than the retention period
//!
//! A cleanup pass runs once at startup and then on a fixed interval (daily by
//! default). Child rows go with their run. A failed pass is logged and retried
//! on the next interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, instrument, trace, warn};

use crate::storage::RunStore;

use super::messages::RetentionCommand;

/// Cleanup interval - run retention cleanup daily
pub const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

pub struct RetentionActor {
    store: Arc<dyn RunStore>,
    retention_days: u32,
    interval: Duration,
    command_rx: mpsc::Receiver<RetentionCommand>,
}

impl RetentionActor {
    #[instrument(skip(self), fields(retention_days = self.retention_days))]
    pub async fn run(mut self) {
        debug!("starting retention actor");

        // First tick fires immediately, which gives the startup pass
        let mut cleanup_interval = time::interval(self.interval);
        cleanup_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cleanup_interval.tick() => {
                    if let Err(e) = self.cleanup().await {
                        error!("retention cleanup failed: {:#}", e);
                    }
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        RetentionCommand::CleanupNow { respond_to } => {
                            let _ = respond_to.send(self.cleanup().await);
                        }

                        RetentionCommand::Shutdown => {
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

        debug!("retention actor stopped");
    }

    async fn cleanup(&self) -> Result<usize> {
        let cutoff = Utc::now() - TimeDelta::days(i64::from(self.retention_days));
        debug!("running retention cleanup (deleting runs before {})", cutoff);

        let deleted = self
            .store
            .delete_runs_before(cutoff)
            .await
            .context("failed to delete old runs")?;

        if deleted > 0 {
            info!("retention cleanup complete: deleted {} old runs", deleted);
        } else {
            trace!("retention cleanup: no old runs to delete");
        }

        Ok(deleted)
    }
}

/// Handle for controlling a RetentionActor
#[derive(Clone)]
pub struct RetentionHandle {
    sender: mpsc::Sender<RetentionCommand>,
}

impl RetentionHandle {
    pub fn spawn(store: Arc<dyn RunStore>, retention_days: u32, interval: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);

        let actor = RetentionActor {
            store,
            retention_days,
            interval,
            command_rx: cmd_rx,
        };
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn cleanup_now(&self) -> Result<usize> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RetentionCommand::CleanupNow { respond_to: tx })
            .await
            .context("failed to send CleanupNow command")?;

        rx.await.context("failed to receive response")?
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(RetentionCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
