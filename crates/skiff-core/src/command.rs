//! The tagged command model — one queued mutation per entity.
//!
//! A [`Command`] is a durable description of an intended Create, Update, or
//! Delete. The envelope fields are flat and the variant payload is tagged
//! with `type`, matching the bulk-submission wire shape:
//!
//! ```json
//! { "commandId": "…", "userId": "u1", "entityId": "t1",
//!   "timestamp": "…", "type": "update",
//!   "changedFields": { "title": "Buy oat milk" } }
//! ```

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The mutation payload, tagged by kind.
///
/// A sum type on purpose — the reference behavior's subclass-per-command
/// hierarchy has no place here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CommandKind {
    /// Create a new entity with the full initial field set.
    #[serde(rename_all = "camelCase")]
    Create {
        /// Full initial field map (wire names from [`crate::fields`]).
        created_fields: BTreeMap<String, Value>,
    },
    /// Update an existing entity with only the changed fields.
    #[serde(rename_all = "camelCase")]
    Update {
        /// Changed-field map; absent keys are untouched.
        changed_fields: BTreeMap<String, Value>,
    },
    /// Delete an entity.
    #[serde(rename_all = "camelCase")]
    Delete {
        /// Optional caller-supplied reason, forwarded to the authority.
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
}

impl CommandKind {
    /// Short wire label, for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

/// A queued command: envelope plus tagged payload.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    /// Unique id, minted at enqueue time.
    pub command_id: String,
    /// Owner of the queue this command belongs to.
    pub user_id: String,
    /// Target entity.
    pub entity_id: String,
    /// When the command was enqueued.
    pub timestamp: DateTime<Utc>,
    /// The mutation itself.
    #[serde(flatten)]
    pub kind: CommandKind,
}

impl Command {
    /// Mint a new command for `entity_id` owned by `user_id`.
    pub fn new(user_id: impl Into<String>, entity_id: impl Into<String>, kind: CommandKind) -> Self {
        Self {
            command_id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            entity_id: entity_id.into(),
            timestamp: Utc::now(),
            kind,
        }
    }

    /// Whether this is an Update command.
    pub fn is_update(&self) -> bool {
        matches!(self.kind, CommandKind::Update { .. })
    }
}
