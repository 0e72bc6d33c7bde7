//! Browser automation boundary
//!
//! The check executor drives pages through these traits and never talks to a
//! concrete engine. An engine is launched once per run; each page gets its own
//! isolated [`PageSession`].
//!
//! ## Session protocol
//!
//! ```text
//! new_session() → subscribe() → navigate(url, timeout) → wait_for_load(timeout) → timing() → close()
//! ```
//!
//! Events observed during navigation and loading are delivered through the
//! receiver returned by `subscribe`, in the order the engine saw them.
//!
//! ## Engines
//!
//! - [`http::HttpEngine`]: fetches documents and their static sub-resources with reqwest
//! - [`scripted::ScriptedEngine`]: deterministic replay, used by tests and dry runs

pub mod http;
pub mod scripted;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Kind of resource a request was made for
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Script,
    Image,
    Font,
    Xhr,
    Fetch,
    Other(String),
}

impl ResourceType {
    pub fn as_str(&self) -> &str {
        match self {
            ResourceType::Document => "document",
            ResourceType::Stylesheet => "stylesheet",
            ResourceType::Script => "script",
            ResourceType::Image => "image",
            ResourceType::Font => "font",
            ResourceType::Xhr => "xhr",
            ResourceType::Fetch => "fetch",
            ResourceType::Other(other) => other,
        }
    }
}

impl From<&str> for ResourceType {
    fn from(value: &str) -> Self {
        match value {
            "document" => ResourceType::Document,
            "stylesheet" => ResourceType::Stylesheet,
            "script" => ResourceType::Script,
            "image" => ResourceType::Image,
            "font" => ResourceType::Font,
            "xhr" => ResourceType::Xhr,
            "fetch" => ResourceType::Fetch,
            other => ResourceType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Console message level as reported by the page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Debug,
    Warning,
    Error,
}

/// A response observed by the page
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseInfo {
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub resource_type: ResourceType,
    /// Size of the response body, when the engine could read it
    pub body_bytes: Option<u64>,
    pub duration_ms: Option<u64>,
}

/// Raw events an engine reports for one page session
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserEvent {
    Request {
        url: String,
        resource_type: ResourceType,
    },
    Response(ResponseInfo),
    /// Transport-level failure, no response was received
    RequestFailed {
        url: String,
        resource_type: ResourceType,
        error: String,
    },
    Console {
        level: ConsoleLevel,
        text: String,
    },
    /// Uncaught script error on the page
    PageError {
        message: String,
    },
}

/// Navigation timing marks in milliseconds, relative to an engine-defined origin
///
/// Marks follow the W3C navigation timing names. A mark of `0` means the
/// corresponding event never fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationTiming {
    pub navigation_start: Option<f64>,
    pub request_start: Option<f64>,
    pub response_start: Option<f64>,
    pub dom_content_loaded_event_end: Option<f64>,
    pub load_event_end: Option<f64>,
}

/// Options applied when launching an engine
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub user_agent: Option<String>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            user_agent: None,
        }
    }
}

/// Errors raised by browser engines
#[derive(Debug, Clone, PartialEq)]
pub enum BrowserError {
    /// The engine could not be started (fatal for the whole run)
    Launch(String),

    /// A new page session could not be opened
    Session(String),

    /// Navigation failed (DNS, connection refused, invalid URL, ...)
    Navigation(String),

    /// An operation exceeded its deadline
    Timeout(Duration),

    /// The session was used after it was closed
    Closed,
}

impl fmt::Display for BrowserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BrowserError::Launch(msg) => write!(f, "browser failed to launch: {msg}"),
            BrowserError::Session(msg) => write!(f, "failed to open page session: {msg}"),
            BrowserError::Navigation(msg) => write!(f, "navigation failed: {msg}"),
            BrowserError::Timeout(after) => {
                write!(f, "timeout of {}ms exceeded", after.as_millis())
            }
            BrowserError::Closed => write!(f, "page session already closed"),
        }
    }
}

impl std::error::Error for BrowserError {}

/// A browser automation engine
#[async_trait]
pub trait BrowserEngine: Send + Sync {
    /// Start a browser instance for one run
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Browser>, BrowserError>;
}

/// A running browser instance
#[async_trait]
pub trait Browser: Send + Sync {
    /// Open an isolated page session
    async fn new_session(&self) -> Result<Box<dyn PageSession>, BrowserError>;

    async fn close(self: Box<Self>);
}

/// One isolated page
#[async_trait]
pub trait PageSession: Send {
    /// Attach an observer; must be called before `navigate` to see all events
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<BrowserEvent>;

    /// Navigate to `url`, returning the final URL after redirects
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<String, BrowserError>;

    /// Wait until the page reached its load-complete state
    async fn wait_for_load(&mut self, timeout: Duration) -> Result<(), BrowserError>;

    /// Navigation timing snapshot, if the engine can provide one
    async fn timing(&mut self) -> Option<NavigationTiming>;

    async fn close(self: Box<Self>);
}
