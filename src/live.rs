//! Live event bus
//!
//! Per-site fan-out of run completions to connected dashboard clients.
//!
//! Every subscriber owns an unbounded channel registered under its site. The
//! registry lock is held while a subscriber is inserted (together with its
//! connect acknowledgement) and while a publish walks the site's list, so a
//! subscriber registered before a publish starts always receives it and one
//! registered during a publish receives the next one.
//!
//! Subscribers leave the registry when:
//! - the [`Subscription`] is dropped (client disconnected)
//! - a delivery fails (receiver gone), during the publish that noticed it
//! - nothing was received for the idle timeout
//!
//! A site's entry is removed as soon as its list becomes empty.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::Stream;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::model::{Run, RunId, RunStatus, SiteId};

/// Payload of a `run_completed` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunCompletedEvent {
    pub run_id: RunId,
    pub status: RunStatus,
    pub critical: u32,
    pub major: u32,
    pub minor: u32,
}

impl From<&Run> for RunCompletedEvent {
    fn from(run: &Run) -> Self {
        Self {
            run_id: run.id,
            status: run.status,
            critical: run.critical_count,
            major: run.major_count,
            minor: run.minor_count,
        }
    }
}

/// Event delivered to a subscriber
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiveEvent {
    /// Connect acknowledgement, always the first event
    Connected { site_id: SiteId },
    RunCompleted(RunCompletedEvent),
}

impl LiveEvent {
    /// Event name on the wire
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::Connected { .. } => "connected",
            LiveEvent::RunCompleted(_) => "run_completed",
        }
    }
}

struct Slot {
    id: u64,
    sender: mpsc::UnboundedSender<LiveEvent>,
}

struct Registry {
    sites: Mutex<HashMap<SiteId, Vec<Slot>>>,
    next_id: AtomicU64,
}

impl Registry {
    fn lock(&self) -> MutexGuard<'_, HashMap<SiteId, Vec<Slot>>> {
        self.sites.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn remove(&self, site_id: SiteId, id: u64) {
        let mut sites = self.lock();
        if let Some(slots) = sites.get_mut(&site_id) {
            slots.retain(|slot| slot.id != id);
            if slots.is_empty() {
                sites.remove(&site_id);
            }
        }
    }
}

/// Registry of live subscribers, cheap to clone
#[derive(Clone)]
pub struct LiveEventBus {
    registry: Arc<Registry>,
    idle_timeout: Duration,
}

impl LiveEventBus {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            registry: Arc::new(Registry {
                sites: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
            }),
            idle_timeout,
        }
    }

    /// Register a subscriber for one site
    pub fn subscribe(&self, site_id: SiteId) -> Subscription {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let (sender, receiver) = mpsc::unbounded_channel();

        let _ = sender.send(LiveEvent::Connected { site_id });
        self.registry
            .lock()
            .entry(site_id)
            .or_default()
            .push(Slot { id, sender });

        debug!(site_id, subscriber = id, "live subscriber connected");

        Subscription {
            id,
            site_id,
            receiver,
            registry: self.registry.clone(),
            idle_timeout: self.idle_timeout,
        }
    }

    /// Push a run completion to every subscriber of the run's site
    ///
    /// Returns the number of subscribers reached. Subscribers whose channel is
    /// gone are dropped from the registry on the way.
    pub fn publish(&self, run: &Run) -> usize {
        let event = LiveEvent::RunCompleted(RunCompletedEvent::from(run));

        let mut sites = self.registry.lock();
        let Some(slots) = sites.get_mut(&run.site_id) else {
            trace!(site_id = run.site_id, "no live subscribers");
            return 0;
        };

        let before = slots.len();
        slots.retain(|slot| slot.sender.send(event.clone()).is_ok());
        let delivered = slots.len();

        if delivered < before {
            debug!(
                site_id = run.site_id,
                "pruned {} disconnected subscribers",
                before - delivered
            );
        }
        if slots.is_empty() {
            sites.remove(&run.site_id);
        }

        delivered
    }

    pub fn subscriber_count(&self, site_id: SiteId) -> usize {
        self.registry.lock().get(&site_id).map_or(0, Vec::len)
    }

    pub fn total_subscribers(&self) -> usize {
        self.registry.lock().values().map(Vec::len).sum()
    }

    /// Number of sites with at least one subscriber
    pub fn site_count(&self) -> usize {
        self.registry.lock().len()
    }
}

/// One connected client
///
/// Dropping the subscription unregisters it.
pub struct Subscription {
    id: u64,
    site_id: SiteId,
    receiver: mpsc::UnboundedReceiver<LiveEvent>,
    registry: Arc<Registry>,
    idle_timeout: Duration,
}

impl Subscription {
    pub fn site_id(&self) -> SiteId {
        self.site_id
    }

    /// Next event, or `None` once the subscription ended
    ///
    /// Waiting longer than the idle timeout ends the subscription.
    pub async fn recv(&mut self) -> Option<LiveEvent> {
        match tokio::time::timeout(self.idle_timeout, self.receiver.recv()).await {
            Ok(event) => event,
            Err(_) => {
                debug!(
                    site_id = self.site_id,
                    subscriber = self.id,
                    "live subscriber idle, disconnecting"
                );
                self.registry.remove(self.site_id, self.id);
                self.receiver.close();
                None
            }
        }
    }

    /// Next already queued event, without waiting
    pub fn try_recv(&mut self) -> Option<LiveEvent> {
        self.receiver.try_recv().ok()
    }

    pub fn into_stream(self) -> impl Stream<Item = LiveEvent> + Send {
        futures::stream::unfold(self, |mut subscription| async move {
            let event = subscription.recv().await?;
            Some((event, subscription))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.remove(self.site_id, self.id);
    }
}
