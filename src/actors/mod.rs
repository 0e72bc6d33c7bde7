//! Actor-based check pipeline
//!
//! Each actor runs as an independent async task communicating via Tokio channels.
//!
//! ## Architecture Overview
//!
//! ```text
//!   ┌────────────────┐  TriggerMessage   ┌────────────────┐
//!   │ SchedulerActor │ ───────────────▶  │                │
//!   └────────────────┘   (bounded mpsc)  │  RunnerActor   │ ── CheckExecutor ──┐
//!   ┌────────────────┐                   │                │                    │
//!   │ API (manual)   │ ───────────────▶  └────────────────┘                    │
//!   └────────────────┘                                                         ▼
//!                                         ┌──────────────────────────────────────┐
//!                                         │ IngestPipeline → RunStore + LiveBus  │
//!                                         └──────────────────────────────────────┘
//! ```
//!
//! ## Actor Types
//!
//! - **SchedulerActor**: Evaluates due sites on a fixed tick
//! - **RunnerActor**: Executes triggered runs with bounded concurrency
//! - **RetentionActor**: Deletes runs past the retention period
//!
//! ## Communication Patterns
//!
//! 1. **Commands**: Each actor has an mpsc command channel for control messages
//! 2. **Triggers**: A bounded mpsc channel decouples producers from the runner
//! 3. **Request/Response**: oneshot channels for synchronous queries

pub mod messages;
pub mod retention;
pub mod runner;
pub mod scheduler;
