//! # skiff-core
//!
//! Foundation types for the Skiff offline-first sync engine.
//!
//! This crate provides the shared vocabulary that all other Skiff crates
//! depend on:
//!
//! - **Entities**: [`task::Task`] and [`folder::Folder`] — immutable values
//!   built via [`task::TaskBuilder`], identity by id alone
//! - **Markers**: [`task::SyncMarker`] and [`task::TaskStatus`]
//! - **Commands**: [`command::Command`] — the tagged Create/Update/Delete
//!   mutation model queued by the store and drained by the orchestrator
//! - **Errors**: [`errors::CoreError`] via `thiserror`
//!
//! ## Crate Position
//!
//! Foundation crate. Depended on by all other skiff crates.

#![deny(unsafe_code)]

pub mod command;
pub mod errors;
pub mod fields;
pub mod folder;
pub mod task;

pub use command::{Command, CommandKind};
pub use errors::{CoreError, Result};
pub use folder::Folder;
pub use task::{FolderRef, SyncMarker, Task, TaskBuilder, TaskStatus};
