//! Remote authority errors.

use thiserror::Error;

/// Errors raised while talking to the remote authority.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Transport-level failure (connect, timeout, body decode).
    #[error("remote transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The authority answered with an unexpected status code.
    #[error("remote returned unexpected status {status}")]
    UnexpectedStatus {
        /// The offending status code.
        status: reqwest::StatusCode,
    },
}

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, RemoteError>;
