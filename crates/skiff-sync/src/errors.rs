//! Sync errors.

use thiserror::Error;

/// Errors raised by the sync orchestrator and engine facade.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote call failed; the cycle aborted at that step.
    #[error(transparent)]
    Remote(#[from] skiff_remote::RemoteError),

    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] skiff_store::StoreError),

    /// The engine was already closed.
    #[error("engine is closed")]
    Closed,
}

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, SyncError>;
