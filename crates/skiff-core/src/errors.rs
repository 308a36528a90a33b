//! Core validation errors.

use thiserror::Error;

/// Errors raised while constructing or patching core entities.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Entity id was empty or whitespace.
    #[error("entity id must not be empty")]
    EmptyId,

    /// Task title was empty or whitespace.
    #[error("task title must not be empty")]
    EmptyTitle,

    /// Folder name was empty or whitespace.
    #[error("folder name must not be empty")]
    EmptyFolderName,

    /// A field value could not be interpreted.
    #[error("invalid value for field '{field}': {message}")]
    InvalidField {
        /// Wire name of the offending field.
        field: String,
        /// Human-readable description of the problem.
        message: String,
    },
}

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, CoreError>;
