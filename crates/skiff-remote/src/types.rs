//! Wire types for the remote authority contract.
//!
//! All shapes are camelCase JSON. The engine does not promise byte-exact
//! compatibility with any particular backend; these types define the
//! abstract request/response contract the orchestrator consumes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use skiff_core::{Command, Folder, Task, fields};

/// Bulk command submission request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandBatchRequest {
    /// Queue owner.
    pub user_id: String,
    /// Commands in queue order.
    pub commands: Vec<Command>,
}

/// Acknowledgment for one accepted command.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandAck {
    /// Id of the acknowledged command.
    pub command_id: String,
    /// Target entity, echoed back by the authority.
    pub entity_id: String,
}

/// A field-level conflict reported alongside the batch result.
///
/// Carries the authoritative row; the engine's policy is server-wins, so
/// this payload is applied locally over any pending edit.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictReport {
    /// Entity the conflict was detected on.
    pub entity_id: String,
    /// The command that collided, when the authority attributes one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_id: Option<String>,
    /// Field names the authority rejected, for logging.
    #[serde(default)]
    pub conflicting_fields: Vec<String>,
    /// The authoritative row to apply.
    pub server_row: TaskRow,
}

/// Bulk command submission response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommandBatchResponse {
    /// Commands the authority accepted.
    pub succeeded: Vec<CommandAck>,
    /// Field-level conflicts, resolved server-wins by the engine.
    pub conflicts: Vec<ConflictReport>,
    /// Rows the authority changed as a side effect of this batch.
    pub server_changes: Vec<TaskRow>,
}

/// A row-object payload representing one entity.
///
/// The id and the deleted flag are structural; every other cell rides in
/// the flattened field map keyed by the wire names in
/// [`skiff_core::fields`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRow {
    /// Entity id.
    pub id: String,
    /// Whether the entity was deleted on the authority.
    #[serde(default)]
    pub deleted: bool,
    /// Remaining cells.
    #[serde(flatten)]
    pub cells: BTreeMap<String, Value>,
}

impl TaskRow {
    /// Reconstruct the entity this row describes.
    pub fn to_task(&self) -> skiff_core::Result<Task> {
        Task::from_fields(&self.id, &self.cells)
    }

    /// Build a row from a task (test fixtures and fakes).
    pub fn from_task(task: &Task) -> Self {
        Self {
            id: task.id.clone(),
            deleted: task.is_tombstoned(),
            cells: task.to_fields(),
        }
    }

    /// The row's synchronization timestamp, if present.
    pub fn last_synced_at(&self) -> Option<DateTime<Utc>> {
        self.cells
            .get(fields::LAST_SYNCED_AT)
            .and_then(Value::as_str)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|at| at.with_timezone(&Utc))
    }
}

/// One out-of-band change notification.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeNotification {
    /// Notification id, acknowledged after delivery.
    pub notification_id: String,
    /// Event discriminator (for example `task.updated`).
    pub event_type: String,
    /// Entity the event concerns.
    pub entity_id: String,
    /// Entity kind (for example `task` or `folder`).
    pub entity_type: String,
    /// Opaque event payload.
    #[serde(default)]
    pub event_data: Value,
}

/// Notification acknowledgment request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationAckRequest {
    /// Queue owner.
    pub user_id: String,
    /// Ids delivered and applied.
    pub notification_ids: Vec<String>,
}

/// Folder listing response.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderListing {
    /// Full folder record set.
    pub folders: Vec<Folder>,
    /// Opaque version token for the listing.
    pub version: Option<String>,
}
