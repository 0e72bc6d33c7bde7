use crate::browser::{BrowserEvent, ConsoleLevel};
use crate::model::{Failure, FailureType, Severity};

/// Console observer for one page session
///
/// Only `error` and `warning` messages are kept; uncaught page errors are
/// always critical.
#[derive(Debug, Default)]
pub struct ConsoleCollector {
    failures: Vec<Failure>,
}

impl ConsoleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, event: &BrowserEvent) {
        match event {
            BrowserEvent::Console { level, text } => {
                let severity = match level {
                    ConsoleLevel::Error => Severity::Major,
                    ConsoleLevel::Warning => Severity::Minor,
                    _ => return,
                };
                let label = if *level == ConsoleLevel::Error {
                    "error"
                } else {
                    "warning"
                };
                self.failures.push(Failure::new(
                    severity,
                    FailureType::ConsoleError,
                    format!("Console {label}: {text}"),
                ));
            }
            BrowserEvent::PageError { message } => {
                self.failures.push(Failure::new(
                    Severity::Critical,
                    FailureType::JsError,
                    format!("JavaScript error: {message}"),
                ));
            }
            _ => {}
        }
    }

    pub fn into_failures(self) -> Vec<Failure> {
        self.failures
    }
}
