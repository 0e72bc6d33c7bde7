//! HTTP-only browser engine
//!
//! Loads a page the way a browser without a script runtime would: the
//! document is fetched during `navigate`, then `wait_for_load` fetches every
//! stylesheet, script, image, icon and preloaded font the markup references.
//! Every exchange is reported through the same event vocabulary as a full
//! browser, so collectors classify both identically. Console and page-error
//! events never occur because no script is executed.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use scraper::{Html, Selector};
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace};
use url::Url;

use super::{
    Browser, BrowserEngine, BrowserError, BrowserEvent, LaunchOptions, NavigationTiming,
    PageSession, ResourceType, ResponseInfo,
};

const DEFAULT_USER_AGENT: &str = concat!("sentinel-hub/", env!("CARGO_PKG_VERSION"));

const MAX_REDIRECTS: usize = 10;

/// Engine backed by a shared reqwest client
#[derive(Debug, Clone, Default)]
pub struct HttpEngine;

impl HttpEngine {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BrowserEngine for HttpEngine {
    async fn launch(&self, options: &LaunchOptions) -> Result<Box<dyn Browser>, BrowserError> {
        let user_agent = options
            .user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        Ok(Box::new(HttpBrowser { client }))
    }
}

struct HttpBrowser {
    client: reqwest::Client,
}

#[async_trait]
impl Browser for HttpBrowser {
    async fn new_session(&self) -> Result<Box<dyn PageSession>, BrowserError> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            observer: None,
            document: None,
            timing: None,
            closed: false,
        }))
    }

    async fn close(self: Box<Self>) {}
}

struct LoadedDocument {
    url: Url,
    body: String,
    started: Instant,
}

struct HttpSession {
    client: reqwest::Client,
    observer: Option<mpsc::UnboundedSender<BrowserEvent>>,
    document: Option<LoadedDocument>,
    timing: Option<NavigationTiming>,
    closed: bool,
}

impl HttpSession {
    fn emit(&self, event: BrowserEvent) {
        emit(self.observer.as_ref(), event);
    }
}

fn emit(observer: Option<&mpsc::UnboundedSender<BrowserEvent>>, event: BrowserEvent) {
    if let Some(observer) = observer {
        let _ = observer.send(event);
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[async_trait]
impl PageSession for HttpSession {
    fn subscribe(&mut self) -> mpsc::UnboundedReceiver<BrowserEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observer = Some(tx);
        rx
    }

    #[instrument(skip(self, timeout))]
    async fn navigate(&mut self, url: &str, timeout: Duration) -> Result<String, BrowserError> {
        if self.closed {
            return Err(BrowserError::Closed);
        }

        let target = Url::parse(url).map_err(|e| BrowserError::Navigation(format!("{url}: {e}")))?;

        let started = Instant::now();
        let navigation_start = Utc::now().timestamp_millis() as f64;

        self.emit(BrowserEvent::Request {
            url: target.to_string(),
            resource_type: ResourceType::Document,
        });

        let response = match tokio::time::timeout(timeout, self.client.get(target.clone()).send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                self.emit(BrowserEvent::RequestFailed {
                    url: target.to_string(),
                    resource_type: ResourceType::Document,
                    error: e.to_string(),
                });
                return Err(BrowserError::Navigation(e.to_string()));
            }
            Err(_) => return Err(BrowserError::Timeout(timeout)),
        };

        let response_start = elapsed_ms(started);
        let status = response.status();
        let final_url = response.url().clone();

        let remaining = timeout.saturating_sub(started.elapsed());
        let body = match tokio::time::timeout(remaining, response.text()).await {
            Ok(Ok(body)) => body,
            Ok(Err(e)) => {
                self.emit(BrowserEvent::RequestFailed {
                    url: final_url.to_string(),
                    resource_type: ResourceType::Document,
                    error: e.to_string(),
                });
                return Err(BrowserError::Navigation(e.to_string()));
            }
            Err(_) => return Err(BrowserError::Timeout(timeout)),
        };
        let dom_ready = elapsed_ms(started);

        self.emit(BrowserEvent::Response(ResponseInfo {
            url: final_url.to_string(),
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            resource_type: ResourceType::Document,
            body_bytes: Some(body.len() as u64),
            duration_ms: Some(dom_ready as u64),
        }));

        trace!("document loaded with status {status} in {dom_ready:.0}ms");

        self.timing = Some(NavigationTiming {
            navigation_start: Some(navigation_start),
            request_start: Some(navigation_start),
            response_start: Some(navigation_start + response_start),
            dom_content_loaded_event_end: Some(navigation_start + dom_ready),
            load_event_end: None,
        });
        self.document = Some(LoadedDocument {
            url: final_url.clone(),
            body,
            started,
        });

        Ok(final_url.to_string())
    }

    #[instrument(skip_all)]
    async fn wait_for_load(&mut self, timeout: Duration) -> Result<(), BrowserError> {
        let Some(document) = &self.document else {
            return Err(BrowserError::Navigation("no document loaded".to_string()));
        };

        let assets = extract_assets(&document.url, &document.body);
        debug!("fetching {} sub-resources", assets.len());

        let observer = self.observer.as_ref();
        let fetches = assets
            .into_iter()
            .map(|asset| fetch_asset(&self.client, observer, asset));

        if tokio::time::timeout(timeout, join_all(fetches)).await.is_err() {
            return Err(BrowserError::Timeout(timeout));
        }

        let load_end = elapsed_ms(document.started);
        if let Some(timing) = self.timing.as_mut() {
            timing.load_event_end = timing.navigation_start.map(|start| start + load_end);
        }

        Ok(())
    }

    async fn timing(&mut self) -> Option<NavigationTiming> {
        self.timing
    }

    async fn close(mut self: Box<Self>) {
        self.closed = true;
        self.observer = None;
    }
}

async fn fetch_asset(
    client: &reqwest::Client,
    observer: Option<&mpsc::UnboundedSender<BrowserEvent>>,
    asset: Asset,
) {
    emit(
        observer,
        BrowserEvent::Request {
            url: asset.url.to_string(),
            resource_type: asset.resource_type.clone(),
        },
    );

    let started = Instant::now();
    let response = match client.get(asset.url.clone()).send().await {
        Ok(response) => response,
        Err(e) => {
            emit(
                observer,
                BrowserEvent::RequestFailed {
                    url: asset.url.to_string(),
                    resource_type: asset.resource_type,
                    error: e.to_string(),
                },
            );
            return;
        }
    };

    let status = response.status();
    let url = response.url().to_string();
    let body_bytes = response.bytes().await.ok().map(|body| body.len() as u64);

    emit(
        observer,
        BrowserEvent::Response(ResponseInfo {
            url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            resource_type: asset.resource_type,
            body_bytes,
            duration_ms: Some(started.elapsed().as_millis() as u64),
        }),
    );
}

/// A sub-resource referenced by a document
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Asset {
    pub url: Url,
    pub resource_type: ResourceType,
}

/// Resolve every sub-resource the markup references against `base`,
/// deduplicated, in document order
///
/// Comments and inline script bodies are not markup, so references inside
/// them are never fetched.
pub fn extract_assets(base: &Url, html: &str) -> Vec<Asset> {
    let Ok(selector) = Selector::parse("link[href], script[src], img[src]") else {
        return Vec::new();
    };

    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut assets = Vec::new();

    for element in document.select(&selector) {
        let element = element.value();

        let reference = match element.name() {
            "script" => element.attr("src").map(|src| (src, ResourceType::Script)),
            "img" => element.attr("src").map(|src| (src, ResourceType::Image)),
            "link" => element.attr("href").and_then(|href| {
                link_resource_type(element.attr("rel").unwrap_or_default(), element.attr("as"))
                    .map(|kind| (href, kind))
            }),
            _ => None,
        };

        let Some((reference, resource_type)) = reference else {
            continue;
        };

        let Ok(url) = base.join(reference.trim()) else {
            continue;
        };
        if !matches!(url.scheme(), "http" | "https") {
            continue;
        }

        let asset = Asset { url, resource_type };
        if seen.insert(asset.clone()) {
            assets.push(asset);
        }
    }

    assets
}

fn link_resource_type(rel: &str, as_hint: Option<&str>) -> Option<ResourceType> {
    let rel = rel.to_ascii_lowercase();
    let rels: Vec<&str> = rel.split_whitespace().collect();

    if rels.contains(&"stylesheet") {
        return Some(ResourceType::Stylesheet);
    }
    if rels.iter().any(|r| *r == "icon" || *r == "apple-touch-icon") {
        return Some(ResourceType::Image);
    }
    if rels.contains(&"preload") {
        return match as_hint.map(str::to_ascii_lowercase).as_deref() {
            Some("font") => Some(ResourceType::Font),
            Some("style") => Some(ResourceType::Stylesheet),
            Some("script") => Some(ResourceType::Script),
            Some("image") => Some(ResourceType::Image),
            _ => None,
        };
    }
    None
}
