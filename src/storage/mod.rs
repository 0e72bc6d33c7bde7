//! Run storage
//!
//! Trait-based persistence for sites, runs and their children.
//!
//! ## Design
//!
//! - **Trait-based**: `RunStore` allows swapping implementations
//! - **Async**: All operations are async for compatibility with Tokio actors
//! - **Run-atomic**: A run and all of its children are written in one call
//!
//! ## Backends
//!
//! - **SQLite** (default): Embedded database with migrations
//! - **In-Memory**: No persistence, for tests or storage-less deployments
//!
//! ## Usage
//!
//! ```no_run
//! use synthetic_monitoring::storage::{RunStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./monitoring.db").await?;
//!     let sites = store.list_sites().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, RunStore};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
