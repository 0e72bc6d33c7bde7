//! API shared state

use std::sync::Arc;

use crate::actors::scheduler::TriggerSink;
use crate::dashboard::DashboardService;
use crate::ingest::IngestPipeline;
use crate::live::LiveEventBus;
use crate::storage::RunStore;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// Site configuration and run history
    pub store: Arc<dyn RunStore>,

    /// Read-only statistics over the store
    pub dashboard: DashboardService,

    /// Accepts runs submitted over HTTP
    pub ingest: IngestPipeline,

    /// Live subscribers for the event stream
    pub bus: LiveEventBus,

    /// Destination of manual triggers
    pub triggers: Arc<dyn TriggerSink>,
}

impl ApiState {
    /// Wire the services around one store and event bus
    pub fn new(
        store: Arc<dyn RunStore>,
        bus: LiveEventBus,
        triggers: Arc<dyn TriggerSink>,
    ) -> Self {
        Self {
            dashboard: DashboardService::new(store.clone()),
            ingest: IngestPipeline::new(store.clone(), bus.clone()),
            store,
            bus,
            triggers,
        }
    }
}
