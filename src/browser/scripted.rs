//! Deterministic browser engine that replays scripted page behaviour
//!
//! Each URL maps to a [`PageScript`]: the events the page emits while it
//! loads, its navigation timing and how navigation ends. Unknown URLs fail
//! navigation the way an unresolvable host would.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::trace;

use super::{
    Browser, BrowserEngine, BrowserError, BrowserEvent, ConsoleLevel, LaunchOptions,
    NavigationTiming, PageSession, ResourceType, ResponseInfo,
};

/// How navigation to a scripted page ends
#[derive(Debug, Clone, Default, PartialEq)]
pub enum NavigationOutcome {
    #[default]
    Load,
    Fail(String),
    /// Never completes; surfaces as a timeout
    Hang,
}

/// Scripted behaviour of one page
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    pub events: Vec<BrowserEvent>,
    pub timing: Option<NavigationTiming>,
    pub final_url: Option<String>,
    pub outcome: NavigationOutcome,
}

impl PageScript {
    /// A page that loads with a 200 document and nothing else
    pub fn ok(url: &str) -> Self {
        Self::default()
            .request(url, ResourceType::Document)
            .response(url, 200, ResourceType::Document, 1024)
    }

    pub fn event(mut self, event: BrowserEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn request(self, url: &str, resource_type: ResourceType) -> Self {
        self.event(BrowserEvent::Request {
            url: url.to_string(),
            resource_type,
        })
    }

    pub fn response(self, url: &str, status: u16, resource_type: ResourceType, bytes: u64) -> Self {
        self.event(BrowserEvent::Response(ResponseInfo {
            url: url.to_string(),
            status,
            status_text: status_text(status).to_string(),
            resource_type,
            body_bytes: Some(bytes),
            duration_ms: Some(5),
        }))
    }

    /// Request + response pair for a sub-resource
    pub fn asset(self, url: &str, status: u16, resource_type: ResourceType, bytes: u64) -> Self {
        self.request(url, resource_type.clone())
            .response(url, status, resource_type, bytes)
    }

    pub fn request_failed(self, url: &str, resource_type: ResourceType, error: &str) -> Self {
        self.request(url, resource_type.clone())
            .event(BrowserEvent::RequestFailed {
                url: url.to_string(),
                resource_type,
                error: error.to_string(),
            })
    }

    pub fn console(self, level: ConsoleLevel, text: &str) -> Self {
        self.event(BrowserEvent::Console {
            level,
            text: text.to_string(),
        })
    }

    pub fn page_error(self, message: &str) -> Self {
        self.event(BrowserEvent::PageError {
            message: message.to_string(),
        })
    }

    /// Timing marks expressed as durations from navigation start
    pub fn timing(mut self, ttfb_ms: f64, dom_ms: f64, load_ms: f64) -> Self {
        self.timing = Some(NavigationTiming {
            navigation_start: Some(1_000.0),
            request_start: Some(1_000.0),
            response_start: Some(1_000.0 + ttfb_ms),
            dom_content_loaded_event_end: Some(1_000.0 + dom_ms),
            load_event_end: Some(1_000.0 + load_ms),
        });
        self
    }

    pub fn redirected_to(mut self, url: &str) -> Self {
        self.final_url = Some(url.to_string());
        self
    }

    pub fn failing(mut self, error: &str) -> Self {
        self.outcome = NavigationOutcome::Fail(error.to_string());
        self
    }

    pub fn hanging(mut self) -> Self {
        self.outcome = NavigationOutcome::Hang;
        self
    }
}

fn status_text(status: u16) -> &'static str {
    match status {
        200 => "OK",
        301 => "Moved Permanently",
        404 => "Not Found",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "",
    }
}

#[derive(Debug, Default)]
struct ScriptState {
    pages: HashMap<String, PageScript>,
    launch_error: Option<String>,
    launches: usize,
    open_sessions: usize,
    navigations: Vec<String>,
}

/// Engine replaying [`PageScript`]s
///
/// Clones share the same script and counters.
#[derive(Debug, Clone, Default)]
pub struct ScriptedEngine {
    state: Arc<Mutex<ScriptState>>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(self, url: &str, script: PageScript) -> Self {
        self.lock().pages.insert(url.to_string(), script);
        self
    }

    /// Make every launch fail
    pub fn failing_launch(self, error: &str) -> Self {
        self.lock().launch_error = Some(error.to_string());
        self
    }

    pub fn launches(&self) -> usize {
        self.lock().launches
    }

    /// Sessions opened but not yet closed
    pub fn open_sessions(&self) -> usize {
        self.lock().open_sessions
    }

    /// URLs navigated to, in order
    pub fn navigations(&self) -> Vec<String> {
        self.lock().navigations.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl BrowserEngine for ScriptedEngine {
    async fn launch(&self, _options: &LaunchOptions) -> Result<Box<dyn Browser>, BrowserError> {
        let mut state = self.lock();
        if let Some(error) = &state.launch_error {
            return Err(BrowserError::Launch(error.clone()));
        }
        state.launches += 1;
        drop(state);

        Ok(Box::new(ScriptedBrowser {
            engine: self.clone(),
        }))
    }
}

struct ScriptedBrowser {
    engine: ScriptedEngine,
}

#[async_trait]
impl Browser for ScriptedBrowser {
    async fn new_session(&self) -> Result<Box<dyn PageSession>, BrowserError> {
        self.engine.lock().open_sessions += 1;
        Ok(Box::new(ScriptedSession {
            engine: self.engine.clone(),
            observer: None,
            timing: None,
        }))
    }

    async fn close(self: Box<Self>) {}
}

struct ScriptedSession {
    engine: ScriptedEngine,
    observer: Option<mpsc::UnboundedSender<BrowserEvent>>,
    timing: Option<NavigationTiming>,
}

impl ScriptedSession {
    fn emit(&self, events: Vec<BrowserEvent>) {
        if let Some(observer) = &self.observer {
            for event in events {
                let _ = observer.send(event);
            }
        }
    }
}

#[async_trait]
impl PageSession for ScriptedSession {
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<BrowserEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<String, BrowserError> {
        trace!("scripted navigation to {url}");
        let script = {
            let mut state = self.engine.lock();
            state.navigations.push(url.to_string());
            state.pages.get(url).cloned()
        };

        let Some(script) = script else {
            return Err(BrowserError::Navigation(format!(
                "net::ERR_NAME_NOT_RESOLVED at {url}"
            )));
        };

        self.emit(script.events);
        match script.outcome {
            NavigationOutcome::Load => {
                self.timing = script.timing;
                Ok(script.final_url.unwrap_or_else(|| url.to_string()))
            }
            NavigationOutcome::Fail(error) => Err(BrowserError::Navigation(error)),
            NavigationOutcome::Hang => {
                let _ = tokio::time::timeout(timeout, std::future::pending::<()>()).await;
                Err(BrowserError::Timeout(timeout))
            }
        }
    }

    async fn wait_for_load(&mut self, _timeout: Duration) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn timing(&mut self) -> Option<NavigationTiming> {
        self.timing
    }

    async fn close(self: Box<Self>) {
        let mut state = self.engine.lock();
        state.open_sessions = state.open_sessions.saturating_sub(1);
    }
}
