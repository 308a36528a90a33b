//! The [`Folder`] entity — slowly-changing grouping record for tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{CoreError, Result};
use crate::task::SyncMarker;

/// A folder record.
///
/// Folders change far less often than tasks; the store keeps a snapshot and
/// the folder cache serves id→name lookups between refreshes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Folder {
    /// Stable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Synchronization state.
    #[serde(default)]
    pub sync_marker: SyncMarker,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Tombstone timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Last successful synchronization timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl PartialEq for Folder {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Folder {}

impl Folder {
    /// Construct a folder, validating id and name.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let name = name.into();
        if id.trim().is_empty() {
            return Err(CoreError::EmptyId);
        }
        if name.trim().is_empty() {
            return Err(CoreError::EmptyFolderName);
        }
        Ok(Self {
            id,
            name,
            sync_marker: SyncMarker::default(),
            created_at: Utc::now(),
            deleted_at: None,
            last_synced_at: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn new_validates() {
        assert!(Folder::new("f1", "Groceries").is_ok());
        assert_matches!(Folder::new("", "Groceries"), Err(CoreError::EmptyId));
        assert_matches!(Folder::new("f1", " "), Err(CoreError::EmptyFolderName));
    }
}
