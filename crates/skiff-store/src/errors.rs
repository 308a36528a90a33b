//! Store errors.

use thiserror::Error;

/// Errors raised by the durable store layer.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Durable document I/O failed.
    #[error("document I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Document (de)serialization failed.
    #[error("document serialization failed: {0}")]
    Serde(#[from] serde_json::Error),

    /// Entity validation failed.
    #[error(transparent)]
    Core(#[from] skiff_core::CoreError),

    /// The referenced task does not exist in the store.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// The persistence worker was already shut down.
    #[error("persistence service is shut down")]
    ShutDown,
}

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, StoreError>;
