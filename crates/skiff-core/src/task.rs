//! The [`Task`] entity — the primary synchronized record.
//!
//! Tasks are immutable values: every change produces a new instance, either
//! through the [`TaskBuilder`] or through [`Task::apply_fields`], which
//! overlays a changed-field map (the same map shape carried by queued
//! Update commands and by the durable tabular encoding).
//!
//! Equality, ordering into sets, and hashing are by id alone — no two
//! in-memory entries may share an id.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::errors::{CoreError, Result};
use crate::fields;

/// Lifecycle status of a task.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    /// Not started.
    #[default]
    Pending,
    /// Being worked on.
    InProgress,
    /// Finished.
    Completed,
    /// Kept for history, hidden from active views.
    Archived,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "inProgress"),
            Self::Completed => write!(f, "completed"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Synchronization state of a local entity relative to the remote authority.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncMarker {
    /// Created locally, never enqueued.
    #[default]
    New,
    /// Has a queued command awaiting acknowledgment.
    Pending,
    /// Local-only record, not tracked remotely.
    Local,
    /// Confirmed by the remote authority.
    Cloud,
    /// Remote copy is newer; a refresh is owed.
    ToUpdate,
}

impl std::fmt::Display for SyncMarker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::New => write!(f, "new"),
            Self::Pending => write!(f, "pending"),
            Self::Local => write!(f, "local"),
            Self::Cloud => write!(f, "cloud"),
            Self::ToUpdate => write!(f, "toUpdate"),
        }
    }
}

/// Reference to a folder: id plus the denormalized display name.
///
/// The name is a cache of the folder record's name at the time the
/// reference was written; the folder cache is the authority for lookups.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderRef {
    /// Folder id.
    pub id: String,
    /// Denormalized folder name, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// An immutable task record.
///
/// Field changes never mutate in place — use [`TaskBuilder`] for
/// construction and [`Task::apply_fields`] / the `with_*` helpers for
/// derived copies.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Stable id. Identity and equality are by this field alone.
    pub id: String,
    /// Non-empty title.
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: TaskStatus,
    /// Synchronization state.
    #[serde(default)]
    pub sync_marker: SyncMarker,
    /// Due timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_at: Option<DateTime<Utc>>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Business last-modified timestamp.
    pub updated_at: DateTime<Utc>,
    /// Tombstone timestamp; `Some` means locally deleted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// Last successful synchronization timestamp, assigned by the remote
    /// authority. The canonical field for last-writer-wins comparisons.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Referenced folder, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub folder: Option<FolderRef>,
    /// Free-form metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Task {}

impl Hash for Task {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Task {
    /// Start building a task.
    pub fn builder(id: impl Into<String>, title: impl Into<String>) -> TaskBuilder {
        TaskBuilder::new(id, title)
    }

    /// Whether the task carries a local tombstone.
    pub fn is_tombstoned(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Copy with a different sync marker.
    pub fn with_sync_marker(&self, marker: SyncMarker) -> Self {
        let mut next = self.clone();
        next.sync_marker = marker;
        next
    }

    /// Copy with the last-synced timestamp set.
    pub fn with_last_synced_at(&self, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.last_synced_at = Some(at);
        next
    }

    /// Copy carrying a tombstone.
    pub fn tombstoned(&self, at: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.deleted_at = Some(at);
        next
    }

    /// Copy with the denormalized folder name refreshed.
    ///
    /// No-op when the task has no folder reference.
    pub fn with_folder_name(&self, name: Option<String>) -> Self {
        let mut next = self.clone();
        if let Some(folder) = next.folder.as_mut() {
            folder.name = name;
        }
        next
    }

    /// Overlay a changed-field map, producing a new task.
    ///
    /// Keys are the wire names in [`crate::fields`]. Unknown keys and
    /// values of the wrong shape are skipped with a warning rather than
    /// failing — this is the application path for both locally queued
    /// Update commands and server-wins conflict payloads, and neither may
    /// abort a sync cycle. The sync marker is deliberately not patchable
    /// here; markers are owned by the store and orchestrator.
    pub fn apply_fields(&self, changed: &BTreeMap<String, Value>) -> Self {
        let mut next = self.clone();
        for (key, value) in changed {
            match key.as_str() {
                fields::TITLE => {
                    match value.as_str() {
                        Some(title) if !title.trim().is_empty() => {
                            next.title = title.to_string();
                        }
                        _ => warn!(field = %key, "skipping empty or non-string title patch"),
                    };
                }
                fields::DESCRIPTION => {
                    if let Some(text) = value.as_str() {
                        next.description = text.to_string();
                    }
                }
                fields::STATUS => match serde_json::from_value::<TaskStatus>(value.clone()) {
                    Ok(status) => next.status = status,
                    Err(error) => warn!(field = %key, %error, "skipping unparseable status patch"),
                },
                fields::DUE_AT => next.due_at = parse_optional_datetime(key, value),
                fields::UPDATED_AT => {
                    if let Some(at) = parse_optional_datetime(key, value) {
                        next.updated_at = at;
                    }
                }
                fields::DELETED_AT => next.deleted_at = parse_optional_datetime(key, value),
                fields::LAST_SYNCED_AT => {
                    next.last_synced_at = parse_optional_datetime(key, value);
                }
                fields::FOLDER_ID => match value.as_str() {
                    Some(id) => {
                        let name = next.folder.take().and_then(|f| f.name);
                        next.folder = Some(FolderRef {
                            id: id.to_string(),
                            name,
                        });
                    }
                    None => next.folder = None,
                },
                fields::FOLDER_NAME => {
                    if let Some(folder) = next.folder.as_mut() {
                        folder.name = value.as_str().map(ToString::to_string);
                    }
                }
                fields::METADATA => {
                    if let Some(object) = value.as_object() {
                        for (meta_key, meta_value) in object {
                            let _ = next
                                .metadata
                                .insert(meta_key.clone(), meta_value.clone());
                        }
                    }
                }
                other => warn!(field = %other, "skipping unknown field in patch"),
            }
        }
        next
    }

    /// Encode the patchable fields as a wire-named map.
    ///
    /// The inverse of [`Task::from_fields`]; used by Create command
    /// payloads and the tabular document encoding. The id is not included.
    pub fn to_fields(&self) -> BTreeMap<String, Value> {
        let mut map = BTreeMap::new();
        let _ = map.insert(fields::TITLE.to_string(), Value::from(self.title.clone()));
        let _ = map.insert(
            fields::DESCRIPTION.to_string(),
            Value::from(self.description.clone()),
        );
        let _ = map.insert(
            fields::STATUS.to_string(),
            serde_json::to_value(self.status).unwrap_or(Value::Null),
        );
        let _ = map.insert(
            fields::SYNC_MARKER.to_string(),
            serde_json::to_value(self.sync_marker).unwrap_or(Value::Null),
        );
        let _ = map.insert(fields::DUE_AT.to_string(), datetime_value(self.due_at));
        let _ = map.insert(
            fields::CREATED_AT.to_string(),
            datetime_value(Some(self.created_at)),
        );
        let _ = map.insert(
            fields::UPDATED_AT.to_string(),
            datetime_value(Some(self.updated_at)),
        );
        let _ = map.insert(
            fields::DELETED_AT.to_string(),
            datetime_value(self.deleted_at),
        );
        let _ = map.insert(
            fields::LAST_SYNCED_AT.to_string(),
            datetime_value(self.last_synced_at),
        );
        if let Some(folder) = &self.folder {
            let _ = map.insert(
                fields::FOLDER_ID.to_string(),
                Value::from(folder.id.clone()),
            );
            if let Some(name) = &folder.name {
                let _ = map.insert(fields::FOLDER_NAME.to_string(), Value::from(name.clone()));
            }
        }
        if !self.metadata.is_empty() {
            let _ = map.insert(
                fields::METADATA.to_string(),
                Value::Object(self.metadata.clone().into_iter().collect()),
            );
        }
        map
    }

    /// Reconstruct a task from an id and a wire-named field map.
    ///
    /// Fails fast when the id or title is missing/empty (spec-level
    /// validation); every other absent field takes its default. Used when
    /// decoding tabular rows and when synthesizing entities from queued
    /// Create commands.
    pub fn from_fields(id: impl Into<String>, fields_map: &BTreeMap<String, Value>) -> Result<Self> {
        let title = fields_map
            .get(fields::TITLE)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let created_at = fields_map
            .get(fields::CREATED_AT)
            .and_then(|v| parse_optional_datetime(fields::CREATED_AT, v));

        let seed = TaskBuilder::new(id, title)
            .created_at(created_at.unwrap_or_else(Utc::now))
            .build()?;

        // The builder validated id/title; everything else overlays.
        let mut rest = fields_map.clone();
        let _ = rest.remove(fields::TITLE);
        let _ = rest.remove(fields::CREATED_AT);
        let marker = rest
            .remove(fields::SYNC_MARKER)
            .and_then(|v| serde_json::from_value::<SyncMarker>(v).ok());
        let mut task = seed.apply_fields(&rest);
        if let Some(marker) = marker {
            task.sync_marker = marker;
        }
        Ok(task)
    }
}

/// Builder for [`Task`]. Validation happens in [`TaskBuilder::build`].
#[derive(Clone, Debug)]
pub struct TaskBuilder {
    id: String,
    title: String,
    description: String,
    status: TaskStatus,
    sync_marker: SyncMarker,
    due_at: Option<DateTime<Utc>>,
    created_at: Option<DateTime<Utc>>,
    folder: Option<FolderRef>,
    metadata: BTreeMap<String, Value>,
}

impl TaskBuilder {
    /// Start a builder with the two mandatory fields.
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::default(),
            sync_marker: SyncMarker::default(),
            due_at: None,
            created_at: None,
            folder: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Set the description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set the status.
    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the sync marker.
    pub fn sync_marker(mut self, marker: SyncMarker) -> Self {
        self.sync_marker = marker;
        self
    }

    /// Set the due timestamp.
    pub fn due_at(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }

    /// Set the creation timestamp (defaults to now).
    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Set the folder reference.
    pub fn folder(mut self, id: impl Into<String>, name: Option<String>) -> Self {
        self.folder = Some(FolderRef {
            id: id.into(),
            name,
        });
        self
    }

    /// Add one metadata entry.
    pub fn metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        let _ = self.metadata.insert(key.into(), value);
        self
    }

    /// Validate and produce the task.
    ///
    /// `updated_at` starts equal to `created_at`.
    pub fn build(self) -> Result<Task> {
        if self.id.trim().is_empty() {
            return Err(CoreError::EmptyId);
        }
        if self.title.trim().is_empty() {
            return Err(CoreError::EmptyTitle);
        }
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        Ok(Task {
            id: self.id,
            title: self.title,
            description: self.description,
            status: self.status,
            sync_marker: self.sync_marker,
            due_at: self.due_at,
            created_at,
            updated_at: created_at,
            deleted_at: None,
            last_synced_at: None,
            folder: self.folder,
            metadata: self.metadata,
        })
    }
}

fn parse_optional_datetime(field: &str, value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Null => None,
        Value::String(raw) => match DateTime::parse_from_rfc3339(raw) {
            Ok(at) => Some(at.with_timezone(&Utc)),
            Err(error) => {
                warn!(%field, %error, "skipping unparseable timestamp");
                None
            }
        },
        other => {
            warn!(%field, value_type = %value_type_name(other), "skipping non-string timestamp");
            None
        }
    }
}

fn datetime_value(at: Option<DateTime<Utc>>) -> Value {
    at.map_or(Value::Null, |at| Value::from(at.to_rfc3339()))
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
