//! # skiff-sync
//!
//! The reconciliation side of the Skiff engine.
//!
//! - [`SyncOrchestrator`] — drains the command queue in batches, applies
//!   authoritative results (echo fetch, server-wins conflicts), pulls
//!   incremental changes, acknowledges notifications, refreshes the folder
//!   cache, and advances the sync checkpoint. At most one cycle runs at a
//!   time; concurrent requests coalesce into a single rerun.
//! - [`SyncEngine`] — the per-user facade that wires the store, caches,
//!   persistence worker, and orchestrator together and owns the `close()`
//!   lifecycle.

#![deny(unsafe_code)]

pub mod engine;
pub mod errors;
pub mod orchestrator;
pub mod report;

pub use engine::SyncEngine;
pub use errors::{Result, SyncError};
pub use orchestrator::SyncOrchestrator;
pub use report::{SyncOutcome, SyncReport};
