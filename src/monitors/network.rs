use tracing::trace;

use crate::browser::{BrowserEvent, ResourceType, ResponseInfo};
use crate::model::{Failure, FailureType, RequestError, Severity};

/// Map a resource type to the failure raised when it answers 404
///
/// Stylesheets and scripts break the page outright, everything else degrades it.
pub fn classify_not_found(resource_type: &ResourceType) -> (FailureType, Severity) {
    match resource_type {
        ResourceType::Stylesheet => (FailureType::Css404, Severity::Critical),
        ResourceType::Script => (FailureType::Js404, Severity::Critical),
        ResourceType::Image => (FailureType::Img404, Severity::Major),
        ResourceType::Font => (FailureType::Font404, Severity::Major),
        _ => (FailureType::Asset404, Severity::Major),
    }
}

/// Network observer for one page session
#[derive(Debug, Default)]
pub struct NetworkCollector {
    requests: u32,
    total_bytes: u64,
    failures: Vec<Failure>,
    request_errors: Vec<RequestError>,
}

impl NetworkCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &BrowserEvent) {
        match event {
            BrowserEvent::Request { .. } => self.requests += 1,
            BrowserEvent::Response(response) => self.on_response(response),
            BrowserEvent::RequestFailed {
                url,
                resource_type,
                error,
            } => self.on_request_failed(url, resource_type, error),
            BrowserEvent::Console { .. } | BrowserEvent::PageError { .. } => {}
        }
    }

    fn on_response(&mut self, response: &ResponseInfo) {
        self.total_bytes += response.body_bytes.unwrap_or(0);

        let status = response.status;
        if status < 400 {
            return;
        }

        trace!("{} answered {status}", response.url);

        self.request_errors.push(RequestError {
            page_id: None,
            resource_type: response.resource_type.to_string(),
            url: response.url.clone(),
            status: Some(status),
            duration_ms: response.duration_ms,
            error_message: Some(response.status_text.clone()),
        });

        if status >= 500 {
            self.failures.push(
                Failure::new(
                    Severity::Critical,
                    FailureType::Xhr5xx,
                    format!("Server error on {}: {status}", response.resource_type),
                )
                .with_url(&response.url),
            );
        } else if status == 404 {
            let (failure_type, severity) = classify_not_found(&response.resource_type);
            self.failures.push(
                Failure::new(
                    severity,
                    failure_type,
                    format!("404 Not Found: {}", response.resource_type),
                )
                .with_url(&response.url),
            );
        }
    }

    fn on_request_failed(&mut self, url: &str, resource_type: &ResourceType, error: &str) {
        trace!("{url} failed: {error}");

        let resource_type = match resource_type.as_str() {
            "" => "unknown".to_string(),
            other => other.to_string(),
        };

        self.request_errors.push(RequestError {
            page_id: None,
            resource_type,
            url: url.to_string(),
            status: None,
            duration_ms: None,
            error_message: Some(error.to_string()),
        });

        self.failures.push(
            Failure::new(
                Severity::Critical,
                FailureType::RequestFailed,
                format!("Request failed: {error}"),
            )
            .with_url(url),
        );
    }

    pub fn requests_count(&self) -> u32 {
        self.requests
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    pub fn into_parts(self) -> (Vec<Failure>, Vec<RequestError>) {
        (self.failures, self.request_errors)
    }
}
