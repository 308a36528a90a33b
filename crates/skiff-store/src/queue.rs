//! The in-memory command queue: ordered, mergeable, replayable.
//!
//! The queue itself is a plain ordered list — durability is owned by
//! [`crate::records::RecordStore`], which persists the whole queue after
//! every mutating call while holding the coarse store lock, so callers
//! never observe a queue state that was not also written out.
//!
//! Merge rule: an Update for an entity that already has a queued Update
//! (anywhere in the queue) folds into the existing command — new keys win,
//! absent keys are preserved, and the merged command keeps the original
//! command's position and id. Create and Delete never merge.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use tracing::{debug, warn};

use skiff_core::{Command, CommandKind, SyncMarker, Task};

/// Ordered pending-command list for one user.
#[derive(Clone, Debug, Default)]
pub struct CommandQueue {
    commands: Vec<Command>,
}

impl CommandQueue {
    /// Rebuild a queue from its persisted command list.
    pub fn from_commands(commands: Vec<Command>) -> Self {
        Self { commands }
    }

    /// Number of pending commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Order-preserving snapshot of the pending commands.
    pub fn pending(&self) -> Vec<Command> {
        self.commands.clone()
    }

    /// Enqueue a command, merging Update-into-Update per the merge rule.
    ///
    /// Returns the id of the command that now represents the mutation —
    /// the original id when a merge happened, the new id otherwise.
    pub fn enqueue(&mut self, command: Command) -> String {
        if let CommandKind::Update { changed_fields } = &command.kind {
            if let Some(existing) = self
                .commands
                .iter_mut()
                .find(|c| c.entity_id == command.entity_id && c.is_update())
            {
                if let CommandKind::Update {
                    changed_fields: existing_fields,
                } = &mut existing.kind
                {
                    for (key, value) in changed_fields {
                        let _ = existing_fields.insert(key.clone(), value.clone());
                    }
                    existing.timestamp = command.timestamp;
                    debug!(
                        entity_id = %command.entity_id,
                        command_id = %existing.command_id,
                        "merged update into queued command"
                    );
                    return existing.command_id.clone();
                }
            }
        }

        let id = command.command_id.clone();
        debug!(entity_id = %command.entity_id, kind = command.kind.label(), "command enqueued");
        self.commands.push(command);
        id
    }

    /// Remove the given commands by id, preserving relative order of the rest.
    pub fn remove(&mut self, ids: &HashSet<String>) {
        let before = self.commands.len();
        self.commands.retain(|c| !ids.contains(&c.command_id));
        debug!(removed = before - self.commands.len(), "commands removed from queue");
    }

    /// Drop every pending command.
    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Replay pending commands over `base`, producing the projected view.
    ///
    /// - Create synthesizes a transient entity (sync marker = pending)
    /// - Update overlays its changed-field map onto the matching entity
    /// - Delete marks the matching entity as tombstoned
    ///
    /// Tombstoned entities stay in the result (marked); the store's read
    /// path decides whether to surface them.
    pub fn project(&self, base: &[Task]) -> Vec<Task> {
        let mut tasks: Vec<Task> = base.to_vec();
        for command in &self.commands {
            match &command.kind {
                CommandKind::Create { created_fields } => {
                    if tasks.iter().any(|t| t.id == command.entity_id) {
                        // The optimistic copy was already applied in memory.
                        continue;
                    }
                    match Task::from_fields(&command.entity_id, created_fields) {
                        Ok(task) => tasks.push(task.with_sync_marker(SyncMarker::Pending)),
                        Err(error) => warn!(
                            entity_id = %command.entity_id,
                            %error,
                            "skipping unreplayable create command"
                        ),
                    }
                }
                CommandKind::Update { changed_fields } => {
                    if let Some(slot) = tasks.iter_mut().find(|t| t.id == command.entity_id) {
                        *slot = slot
                            .apply_fields(changed_fields)
                            .with_sync_marker(SyncMarker::Pending);
                    }
                }
                CommandKind::Delete { .. } => {
                    if let Some(slot) = tasks.iter_mut().find(|t| t.id == command.entity_id) {
                        *slot = slot.tombstoned(command.timestamp);
                    }
                }
            }
        }
        tasks
    }
}

/// Build the full-field payload for a Create command from a task.
pub fn create_payload(task: &Task) -> BTreeMap<String, Value> {
    task.to_fields()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
