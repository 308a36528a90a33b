//! # skiff-remote
//!
//! The remote authority contract for the Skiff engine.
//!
//! [`RemoteAuthority`] is the abstract request/response seam: bulk command
//! submission, echo fetch, incremental pull, notification pull/acknowledge,
//! and folder listing. [`HttpAuthority`] implements it over `reqwest`; the
//! orchestrator and all tests depend only on the trait.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod types;

pub use client::{HttpAuthority, RemoteAuthority};
pub use errors::{RemoteError, Result};
pub use reqwest::StatusCode;
pub use types::{
    ChangeNotification, CommandAck, CommandBatchRequest, CommandBatchResponse, ConflictReport,
    FolderListing, NotificationAckRequest, TaskRow,
};
