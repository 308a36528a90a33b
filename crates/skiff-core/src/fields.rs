//! Wire names for patchable task fields.
//!
//! Changed-field maps (`BTreeMap<String, Value>`) use these keys both in
//! queued commands and in the durable tabular encoding, so the constants
//! live here rather than in either layer.

/// Task title.
pub const TITLE: &str = "title";
/// Task description.
pub const DESCRIPTION: &str = "description";
/// Task status (serialized [`crate::TaskStatus`]).
pub const STATUS: &str = "status";
/// Sync marker (serialized [`crate::SyncMarker`]).
pub const SYNC_MARKER: &str = "syncMarker";
/// Due timestamp (RFC 3339 or null).
pub const DUE_AT: &str = "dueAt";
/// Creation timestamp (RFC 3339).
pub const CREATED_AT: &str = "createdAt";
/// Business last-modified timestamp (RFC 3339).
pub const UPDATED_AT: &str = "updatedAt";
/// Tombstone timestamp (RFC 3339 or null).
pub const DELETED_AT: &str = "deletedAt";
/// Last successful synchronization timestamp (RFC 3339 or null).
pub const LAST_SYNCED_AT: &str = "lastSyncedAt";
/// Referenced folder id.
pub const FOLDER_ID: &str = "folderId";
/// Denormalized folder name.
pub const FOLDER_NAME: &str = "folderName";
/// Free-form metadata object.
pub const METADATA: &str = "metadata";
/// Entity id (only valid in tabular rows, never patchable).
pub const ID: &str = "id";
