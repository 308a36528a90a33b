//! # skiff-store
//!
//! The durable side of the Skiff engine: per-user documents, the mergeable
//! command queue, the optimistic local record store, the debounced batch
//! persistence service, and the folder reference cache.
//!
//! ## Layering
//!
//! - [`documents`] — JSON documents on disk (tabular entity store, queue,
//!   folder cache), atomic writes, damage-tolerant loads
//! - [`queue`] — in-memory ordered command list with the Update merge rule
//!   and the projection replay
//! - [`records`] — [`records::RecordStore`]: the coarse-mutex store that
//!   callers mutate and the orchestrator reconciles
//! - [`persist`] — [`persist::BatchPersistence`]: debounced background
//!   flushing of the entity document
//! - [`folder_cache`] — [`folder_cache::FolderCache`]: TTL- and
//!   version-gated id→folder lookups

#![deny(unsafe_code)]

pub mod documents;
pub mod errors;
pub mod folder_cache;
pub mod persist;
pub mod queue;
pub mod records;

pub use documents::{FolderCacheDocument, QueueDocument, TaskDocument, UserDocuments};
pub use errors::{Result, StoreError};
pub use folder_cache::{FolderCache, FolderRefresh, FolderSource};
pub use persist::{BatchPersistence, FlushFn, PersistenceHandle};
pub use queue::CommandQueue;
pub use records::{NewTask, RecordStore, TaskPatch};
