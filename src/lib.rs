//! Synthetic web monitoring
//!
//! Periodically visits configured pages of monitored sites in a browser,
//! classifies what goes wrong (failed requests, missing assets, script
//! errors, slow loads), stores every run and serves dashboards plus a live
//! stream of run completions.

pub mod actors;
pub mod aggregator;
pub mod browser;
pub mod config;
pub mod dashboard;
pub mod ingest;
pub mod live;
pub mod model;
pub mod monitors;
pub mod storage;
pub mod util;

#[cfg(feature = "api")]
pub mod api;
