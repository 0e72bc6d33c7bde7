//! Check execution and signal collection
//!
//! Three collectors observe every page session:
//!
//! - [`network::NetworkCollector`]: request counts, bytes, HTTP errors and 404 classification
//! - [`console::ConsoleCollector`]: console errors/warnings and uncaught script errors
//! - [`perf::PerfCollector`]: time to first byte, DOM ready and load times
//!
//! [`executor::CheckExecutor`] wires them to a browser session per page.

pub mod console;
pub mod executor;
pub mod network;
pub mod perf;

pub use executor::{CheckExecutor, ExecutorOptions};
