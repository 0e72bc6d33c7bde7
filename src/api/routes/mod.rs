//! HTTP route handlers, one module per resource

pub mod dashboard;
pub mod health;
pub mod ingest;
pub mod sites;
