//! RunnerActor - Consumes triggers and executes checks
//!
//! ## Message Flow
//!
//! ```text
//! TriggerMessage → SiteDirectory (config) → CheckExecutor → RunSink (ingestion)
//!                        │
//!                        └── unknown site / no enabled pages → skipped
//! ```
//!
//! At most `max_concurrent_runs` runs execute at the same time. While all
//! permits are taken, triggers wait in the (bounded) channel and commands are
//! still answered.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, mpsc, oneshot};
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

use crate::model::{RunSubmission, SiteConfig, SiteId};
use crate::monitors::CheckExecutor;
use crate::storage::RunStore;

use super::messages::{RunnerCommand, RunnerStats, TriggerMessage};

/// Source of site check configuration
#[async_trait]
pub trait SiteDirectory: Send + Sync {
    /// Configuration with enabled pages only, `None` for unknown sites
    async fn site_config(&self, site_id: SiteId) -> Result<Option<SiteConfig>>;
}

/// Destination of completed runs
#[async_trait]
pub trait RunSink: Send + Sync {
    async fn submit(&self, run: RunSubmission) -> Result<()>;
}

/// [`SiteDirectory`] reading from a run store
pub struct StoreDirectory {
    store: Arc<dyn RunStore>,
}

impl StoreDirectory {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl SiteDirectory for StoreDirectory {
    async fn site_config(&self, site_id: SiteId) -> Result<Option<SiteConfig>> {
        Ok(self.store.site_config(site_id).await?)
    }
}

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    skipped: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    in_flight: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> RunnerStats {
        RunnerStats {
            received: self.received.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
        }
    }
}

/// Everything a single run needs, shared by all run tasks
struct RunContext {
    directory: Arc<dyn SiteDirectory>,
    executor: CheckExecutor,
    sink: Arc<dyn RunSink>,
    counters: Counters,
}

impl RunContext {
    async fn handle(&self, trigger: TriggerMessage) {
        match self.execute(&trigger).await {
            Ok(true) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(false) => {
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                error!("run failed: {:#}", e);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Returns `false` when the trigger was skipped
    async fn execute(&self, trigger: &TriggerMessage) -> Result<bool> {
        let Some(config) = self
            .directory
            .site_config(trigger.site_id)
            .await
            .context("failed to fetch site configuration")?
        else {
            warn!("site no longer exists, dropping trigger");
            return Ok(false);
        };

        if config.pages.is_empty() {
            debug!("site has no enabled pages, skipping");
            return Ok(false);
        }

        let run = self.executor.execute(&config).await;
        self.sink
            .submit(run)
            .await
            .context("failed to submit run results")?;
        Ok(true)
    }
}

/// Actor consuming trigger messages
pub struct RunnerActor {
    context: Arc<RunContext>,
    semaphore: Arc<Semaphore>,
    trigger_rx: mpsc::Receiver<TriggerMessage>,
    command_rx: mpsc::Receiver<RunnerCommand>,
}

impl RunnerActor {
    #[instrument(skip(self), fields(max_concurrent = self.semaphore.available_permits()))]
    pub async fn run(self) {
        debug!("starting runner actor");

        let RunnerActor {
            context,
            semaphore,
            mut trigger_rx,
            mut command_rx,
        } = self;

        loop {
            // A trigger is only taken once a permit is held, so commands are
            // still served while every run slot is busy
            let next_run = async {
                let permit = semaphore.clone().acquire_owned().await.ok()?;
                let trigger = trigger_rx.recv().await?;
                Some((permit, trigger))
            };

            tokio::select! {
                biased;

                Some(cmd) = command_rx.recv() => {
                    match cmd {
                        RunnerCommand::GetStats { respond_to } => {
                            let _ = respond_to.send(context.counters.snapshot());
                        }

                        RunnerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                Some((permit, trigger)) = next_run => {
                    dispatch(&context, permit, trigger);
                }

                else => {
                    warn!("trigger and command channels closed, shutting down");
                    break;
                }
            }
        }

        debug!("runner actor stopped");
    }
}

fn dispatch(context: &Arc<RunContext>, permit: OwnedSemaphorePermit, trigger: TriggerMessage) {
    let counters = &context.counters;
    counters.received.fetch_add(1, Ordering::Relaxed);

    info!(
        site_id = trigger.site_id,
        "starting {:?} run for {}", trigger.triggered_by, trigger.site_name
    );

    counters.in_flight.fetch_add(1, Ordering::Relaxed);
    let context = context.clone();
    let span = info_span!("run", site_id = trigger.site_id, site = %trigger.site_name);

    tokio::spawn(
        async move {
            context.handle(trigger).await;
            context.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
            drop(permit);
        }
        .instrument(span),
    );
}

/// Handle for controlling a RunnerActor
#[derive(Clone)]
pub struct RunnerHandle {
    sender: mpsc::Sender<RunnerCommand>,
}

impl RunnerHandle {
    pub fn spawn(
        trigger_rx: mpsc::Receiver<TriggerMessage>,
        directory: Arc<dyn SiteDirectory>,
        executor: CheckExecutor,
        sink: Arc<dyn RunSink>,
        max_concurrent_runs: usize,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);

        let actor = RunnerActor {
            context: Arc::new(RunContext {
                directory,
                executor,
                sink,
                counters: Counters::default(),
            }),
            semaphore: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
            trigger_rx,
            command_rx: cmd_rx,
        };
        tokio::spawn(actor.run());

        Self { sender: cmd_tx }
    }

    pub async fn stats(&self) -> Result<RunnerStats> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(RunnerCommand::GetStats { respond_to: tx })
            .await
            .context("failed to send GetStats command")?;

        rx.await.context("failed to receive response")
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(RunnerCommand::Shutdown)
            .await
            .context("failed to send Shutdown command")?;
        Ok(())
    }
}
