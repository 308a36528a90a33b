//! The local record store — authoritative in-memory cache plus the
//! optimistic write path.
//!
//! All mutating entry points take one coarse per-user mutex covering both
//! the entity list and the command queue, so readers may observe a
//! just-committed state but never a partially-applied one. Caller-facing
//! writes (`create`/`update`/`delete`) enqueue a command, apply the change
//! optimistically in memory, synchronously rewrite the durable queue
//! document, and schedule a debounced entity-store flush. `upsert` and
//! `remove_by_id` are reserved for the sync orchestrator: they apply
//! authoritative remote results and bypass the queue entirely.

use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use skiff_core::{
    Command, CommandKind, CoreError, Folder, SyncMarker, Task, TaskStatus, fields,
};

use crate::documents::UserDocuments;
use crate::errors::{Result, StoreError};
use crate::folder_cache::FolderCache;
use crate::persist::PersistenceHandle;
use crate::queue::{CommandQueue, create_payload};

/// Caller-supplied fields for a new task.
#[derive(Clone, Debug, Default)]
pub struct NewTask {
    /// Non-empty title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Due timestamp.
    pub due_at: Option<DateTime<Utc>>,
    /// Folder to file the task under.
    pub folder_id: Option<String>,
    /// Free-form metadata.
    pub metadata: BTreeMap<String, Value>,
}

/// Caller-supplied changes for an update.
///
/// `None` means "leave unchanged"; the nested `Option`s distinguish
/// clearing a field (`Some(None)`) from leaving it alone.
#[derive(Clone, Debug, Default)]
pub struct TaskPatch {
    /// New title.
    pub title: Option<String>,
    /// New description.
    pub description: Option<String>,
    /// New status.
    pub status: Option<TaskStatus>,
    /// New due timestamp, or `Some(None)` to clear.
    pub due_at: Option<Option<DateTime<Utc>>>,
    /// New folder id, or `Some(None)` to unfile.
    pub folder_id: Option<Option<String>>,
    /// Metadata entries to set.
    pub metadata: Option<BTreeMap<String, Value>>,
}

impl TaskPatch {
    /// Compute the changed-field map against `current`.
    ///
    /// Only fields whose value actually differs appear in the result, so
    /// a no-op patch yields an empty map and nothing is enqueued.
    fn diff(&self, current: &Task, folders: &[Folder]) -> BTreeMap<String, Value> {
        let mut changed = BTreeMap::new();
        if let Some(title) = &self.title {
            if *title != current.title {
                let _ = changed.insert(fields::TITLE.to_string(), Value::from(title.clone()));
            }
        }
        if let Some(description) = &self.description {
            if *description != current.description {
                let _ = changed.insert(
                    fields::DESCRIPTION.to_string(),
                    Value::from(description.clone()),
                );
            }
        }
        if let Some(status) = self.status {
            if status != current.status {
                let _ = changed.insert(
                    fields::STATUS.to_string(),
                    serde_json::to_value(status).unwrap_or(Value::Null),
                );
            }
        }
        if let Some(due_at) = self.due_at {
            if due_at != current.due_at {
                let _ = changed.insert(
                    fields::DUE_AT.to_string(),
                    due_at.map_or(Value::Null, |at| Value::from(at.to_rfc3339())),
                );
            }
        }
        if let Some(folder_id) = &self.folder_id {
            let current_id = current.folder.as_ref().map(|f| f.id.as_str());
            if folder_id.as_deref() != current_id {
                let _ = changed.insert(
                    fields::FOLDER_ID.to_string(),
                    folder_id.as_deref().map_or(Value::Null, Value::from),
                );
                if let Some(name) = folder_id
                    .as_deref()
                    .and_then(|id| folders.iter().find(|f| f.id == id))
                    .map(|f| f.name.clone())
                {
                    let _ = changed.insert(fields::FOLDER_NAME.to_string(), Value::from(name));
                }
            }
        }
        if let Some(metadata) = &self.metadata {
            let differing: serde_json::Map<String, Value> = metadata
                .iter()
                .filter(|(key, value)| current.metadata.get(*key) != Some(value))
                .map(|(key, value)| (key.clone(), value.clone()))
                .collect();
            if !differing.is_empty() {
                let _ = changed.insert(fields::METADATA.to_string(), Value::Object(differing));
            }
        }
        changed
    }
}

struct Inner {
    tasks: Vec<Task>,
    folders: Vec<Folder>,
    checkpoint: Option<DateTime<Utc>>,
    queue: CommandQueue,
}

/// The per-user record store.
pub struct RecordStore {
    user_id: String,
    docs: UserDocuments,
    inner: Mutex<Inner>,
    persistence: OnceLock<PersistenceHandle>,
}

impl RecordStore {
    /// Open the store, loading the persisted entity and queue documents.
    pub fn open(user_id: impl Into<String>, docs: UserDocuments) -> Self {
        let state = docs.load_tasks();
        let queue = CommandQueue::from_commands(docs.load_queue());
        info!(
            tasks = state.tasks.len(),
            pending_commands = queue.len(),
            "record store opened"
        );
        Self {
            user_id: user_id.into(),
            docs,
            inner: Mutex::new(Inner {
                tasks: state.tasks,
                folders: state.folders,
                checkpoint: state.sync_checkpoint,
                queue,
            }),
            persistence: OnceLock::new(),
        }
    }

    /// Wire in the batch persistence handle. May be called once.
    pub fn attach_persistence(&self, handle: PersistenceHandle) {
        if self.persistence.set(handle).is_err() {
            warn!("persistence handle attached twice, keeping the first");
        }
    }

    /// The user this store belongs to.
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    // ─────────────────────────────────────────────────────────────────────
    // Caller-facing writes (optimistic, queued)
    // ─────────────────────────────────────────────────────────────────────

    /// Create a task: enqueue a Create command and return the optimistic
    /// copy immediately.
    #[instrument(skip(self, new), fields(user_id = %self.user_id))]
    pub fn create(&self, new: NewTask) -> Result<Task> {
        let id = Uuid::new_v4().to_string();
        let mut inner = self.inner.lock();

        let folder_name = new
            .folder_id
            .as_deref()
            .and_then(|fid| inner.folders.iter().find(|f| f.id == fid))
            .map(|f| f.name.clone());

        let mut builder = Task::builder(&id, &new.title)
            .description(new.description)
            .sync_marker(SyncMarker::Pending);
        if let Some(due_at) = new.due_at {
            builder = builder.due_at(due_at);
        }
        if let Some(folder_id) = &new.folder_id {
            builder = builder.folder(folder_id, folder_name);
        }
        for (key, value) in new.metadata {
            builder = builder.metadata(key, value);
        }
        let task = builder.build()?;

        let _ = inner.queue.enqueue(Command::new(
            &self.user_id,
            &id,
            CommandKind::Create {
                created_fields: create_payload(&task),
            },
        ));
        self.persist_queue(&inner);
        inner.tasks.push(task.clone());
        drop(inner);

        self.schedule_persist();
        debug!(task_id = %task.id, "task created");
        Ok(task)
    }

    /// Update a task: enqueue an Update command carrying only the fields
    /// that actually changed, and apply them optimistically.
    ///
    /// A patch that changes nothing is a no-op — nothing is enqueued and
    /// the current copy is returned.
    #[instrument(skip(self, patch), fields(user_id = %self.user_id, task_id))]
    pub fn update(&self, task_id: &str, patch: &TaskPatch) -> Result<Task> {
        if patch.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(StoreError::Core(CoreError::EmptyTitle));
        }

        let mut inner = self.inner.lock();
        let position = inner
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;

        let mut changed = patch.diff(&inner.tasks[position], &inner.folders);
        if changed.is_empty() {
            debug!(task_id, "update changed nothing, skipping enqueue");
            return Ok(inner.tasks[position].clone());
        }
        let _ = changed.insert(
            fields::UPDATED_AT.to_string(),
            Value::from(Utc::now().to_rfc3339()),
        );

        let _ = inner.queue.enqueue(Command::new(
            &self.user_id,
            task_id,
            CommandKind::Update {
                changed_fields: changed.clone(),
            },
        ));
        self.persist_queue(&inner);

        let updated = inner.tasks[position]
            .apply_fields(&changed)
            .with_sync_marker(SyncMarker::Pending);
        inner.tasks[position] = updated.clone();
        drop(inner);

        self.schedule_persist();
        debug!(task_id, "task updated");
        Ok(updated)
    }

    /// Delete a task: enqueue a Delete command and tombstone the local
    /// copy immediately.
    ///
    /// The entity disappears from [`RecordStore::get_all`] right away
    /// rather than lingering until the next remote round-trip.
    #[instrument(skip(self), fields(user_id = %self.user_id, task_id))]
    pub fn delete(&self, task_id: &str, reason: Option<String>) -> Result<()> {
        let mut inner = self.inner.lock();
        let position = inner
            .tasks
            .iter()
            .position(|t| t.id == task_id)
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;

        let _ = inner.queue.enqueue(Command::new(
            &self.user_id,
            task_id,
            CommandKind::Delete { reason },
        ));
        self.persist_queue(&inner);

        let tombstoned = inner.tasks[position]
            .tombstoned(Utc::now())
            .with_sync_marker(SyncMarker::Pending);
        inner.tasks[position] = tombstoned;
        drop(inner);

        self.schedule_persist();
        debug!(task_id, "task deleted locally");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────

    /// Projected view: pending commands replayed over the entity list,
    /// tombstones hidden, folder names resolved through the cache with
    /// the in-store folder snapshot as fallback.
    pub async fn get_all(&self, cache: &FolderCache) -> Vec<Task> {
        cache.refresh_if_stale().await;

        let (projected, folders) = {
            let inner = self.inner.lock();
            (inner.queue.project(&inner.tasks), inner.folders.clone())
        };

        projected
            .into_iter()
            .filter(|task| !task.is_tombstoned())
            .map(|task| {
                let Some(folder_id) = task.folder.as_ref().map(|f| f.id.clone()) else {
                    return task;
                };
                let name = cache.name_of(&folder_id).or_else(|| {
                    folders
                        .iter()
                        .find(|f| f.id == folder_id)
                        .map(|f| f.name.clone())
                });
                match name {
                    Some(name) => task.with_folder_name(Some(name)),
                    None => task,
                }
            })
            .collect()
    }

    /// Fetch one task (projected, tombstones included) by id.
    pub fn get(&self, task_id: &str) -> Option<Task> {
        let inner = self.inner.lock();
        inner
            .queue
            .project(&inner.tasks)
            .into_iter()
            .find(|t| t.id == task_id)
    }

    /// Whether the store holds no entities at all.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().tasks.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Command queue access
    // ─────────────────────────────────────────────────────────────────────

    /// Order-preserving snapshot of the pending commands.
    pub fn pending_commands(&self) -> Vec<Command> {
        self.inner.lock().queue.pending()
    }

    /// Number of pending commands.
    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    /// Remove acknowledged commands by id and persist the queue.
    pub fn remove_commands(&self, ids: &HashSet<String>) {
        let mut inner = self.inner.lock();
        inner.queue.remove(ids);
        self.persist_queue(&inner);
    }

    /// Drop every pending command and persist the empty queue.
    ///
    /// Escape hatch for the embedding application (reset flows); normal
    /// operation only ever removes acknowledged ids.
    pub fn clear_commands(&self) {
        let mut inner = self.inner.lock();
        inner.queue.clear();
        self.persist_queue(&inner);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Orchestrator-only authoritative application
    // ─────────────────────────────────────────────────────────────────────

    /// Apply an authoritative remote row, bypassing the command queue.
    ///
    /// Last-writer-wins on `last_synced_at`: the incoming row replaces the
    /// local copy when no local copy exists, or when the incoming sync
    /// timestamp is the same as or newer than the local one. A missing
    /// incoming timestamp compares as the epoch, so it never beats a local
    /// copy that has synced. Returns whether the row was applied.
    pub fn upsert(&self, incoming: Task) -> bool {
        let mut inner = self.inner.lock();
        let applied = match inner.tasks.iter().position(|t| t.id == incoming.id) {
            None => {
                inner.tasks.push(incoming);
                true
            }
            Some(position) => {
                let local_ts = inner.tasks[position].last_synced_at;
                let incoming_ts = incoming.last_synced_at;
                if incoming_ts.unwrap_or_default() >= local_ts.unwrap_or_default() {
                    inner.tasks[position] = incoming;
                    true
                } else {
                    debug!(
                        task_id = %incoming.id,
                        "skipping stale remote row (local copy is newer)"
                    );
                    false
                }
            }
        };
        drop(inner);
        if applied {
            self.schedule_persist();
        }
        applied
    }

    /// Hard-remove an entity after remote delete confirmation.
    pub fn remove_by_id(&self, task_id: &str) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.tasks.len();
        inner.tasks.retain(|t| t.id != task_id);
        let removed = inner.tasks.len() < before;
        drop(inner);
        if removed {
            self.schedule_persist();
        }
        removed
    }

    // ─────────────────────────────────────────────────────────────────────
    // Checkpoint and folders
    // ─────────────────────────────────────────────────────────────────────

    /// Current sync checkpoint.
    pub fn checkpoint(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().checkpoint
    }

    /// Advance the checkpoint. Monotonic — an older timestamp is ignored.
    pub fn advance_checkpoint(&self, to: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        if inner.checkpoint.is_some_and(|current| current > to) {
            warn!("ignoring checkpoint that would move backwards");
            return;
        }
        inner.checkpoint = Some(to);
        drop(inner);
        self.schedule_persist();
    }

    /// Snapshot of the in-store folder list.
    pub fn folders(&self) -> Vec<Folder> {
        self.inner.lock().folders.clone()
    }

    /// Replace the in-store folder snapshot.
    pub fn set_folders(&self, folders: Vec<Folder>) {
        self.inner.lock().folders = folders;
        self.schedule_persist();
    }

    // ─────────────────────────────────────────────────────────────────────
    // Durability
    // ─────────────────────────────────────────────────────────────────────

    /// Serialize the current entity state to the durable document.
    ///
    /// This is the flush callback handed to the batch persistence service.
    pub fn write_snapshot(&self) -> Result<()> {
        let inner = self.inner.lock();
        self.docs
            .write_tasks(&inner.tasks, inner.checkpoint, &inner.folders)
    }

    fn schedule_persist(&self) {
        if let Some(handle) = self.persistence.get() {
            handle.schedule();
        }
    }

    /// Synchronous queue write; a failure is logged, never fatal — the
    /// queue document is rewritten wholesale on the next mutation.
    fn persist_queue(&self, inner: &Inner) {
        if let Err(err) = self.docs.write_queue(&inner.queue.pending()) {
            error!(error = %err, "failed to persist command queue");
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::folder_cache::{FolderRefresh, FolderSource};

    struct NoSource;

    #[async_trait]
    impl FolderSource for NoSource {
        async fn fetch_folders(&self) -> anyhow::Result<FolderRefresh> {
            anyhow::bail!("offline")
        }
    }

    fn store() -> (tempfile::TempDir, RecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let docs = UserDocuments::new(dir.path(), "u1");
        (dir, RecordStore::open("u1", docs))
    }

    fn cache(dir: &tempfile::TempDir) -> FolderCache {
        FolderCache::new(
            Duration::from_secs(3600),
            UserDocuments::new(dir.path(), "u1"),
            Arc::new(NoSource),
        )
    }

    #[test]
    fn create_enqueues_one_command_and_is_optimistic() {
        let (_dir, store) = store();
        let task = store
            .create(NewTask {
                title: "Buy milk".to_string(),
                ..NewTask::default()
            })
            .unwrap();

        assert_eq!(task.sync_marker, SyncMarker::Pending);
        assert_eq!(store.queue_len(), 1);
        assert!(store.get(&task.id).is_some());
    }

    #[test]
    fn create_with_empty_title_fails_fast() {
        let (_dir, store) = store();
        let result = store.create(NewTask {
            title: "  ".to_string(),
            ..NewTask::default()
        });
        assert!(result.is_err());
        assert_eq!(store.queue_len(), 0);
    }

    #[test]
    fn update_enqueues_only_changed_fields() {
        let (_dir, store) = store();
        let task = store
            .create(NewTask {
                title: "Buy milk".to_string(),
                description: "two liters".to_string(),
                ..NewTask::default()
            })
            .unwrap();

        let updated = store
            .update(
                &task.id,
                &TaskPatch {
                    description: Some("oat".to_string()),
                    // Same title — must not appear in the diff.
                    title: Some("Buy milk".to_string()),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.description, "oat");

        let pending = store.pending_commands();
        assert_eq!(pending.len(), 2); // Create + Update
        let CommandKind::Update { changed_fields } = &pending[1].kind else {
            panic!("expected update");
        };
        assert!(changed_fields.contains_key(fields::DESCRIPTION));
        assert!(!changed_fields.contains_key(fields::TITLE));
    }

    #[test]
    fn noop_update_enqueues_nothing() {
        let (_dir, store) = store();
        let task = store
            .create(NewTask {
                title: "Buy milk".to_string(),
                ..NewTask::default()
            })
            .unwrap();
        let before = store.queue_len();
        let _ = store.update(&task.id, &TaskPatch::default()).unwrap();
        assert_eq!(store.queue_len(), before);
    }

    #[test]
    fn second_update_merges_into_queued_command() {
        let (_dir, store) = store();
        let task = store
            .create(NewTask {
                title: "Buy milk".to_string(),
                ..NewTask::default()
            })
            .unwrap();

        let _ = store
            .update(
                &task.id,
                &TaskPatch {
                    description: Some("oat".to_string()),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        let _ = store
            .update(
                &task.id,
                &TaskPatch {
                    status: Some(TaskStatus::InProgress),
                    ..TaskPatch::default()
                },
            )
            .unwrap();

        // Still two: the Create and one merged Update carrying both fields.
        let pending = store.pending_commands();
        assert_eq!(pending.len(), 2);
        let CommandKind::Update { changed_fields } = &pending[1].kind else {
            panic!("expected update");
        };
        assert!(changed_fields.contains_key(fields::DESCRIPTION));
        assert!(changed_fields.contains_key(fields::STATUS));
    }

    #[tokio::test]
    async fn delete_is_an_immediate_local_tombstone() {
        let (dir, store) = store();
        let task = store
            .create(NewTask {
                title: "Buy milk".to_string(),
                ..NewTask::default()
            })
            .unwrap();

        store.delete(&task.id, Some("duplicate".to_string())).unwrap();

        let visible = store.get_all(&cache(&dir)).await;
        assert!(visible.is_empty());
        // The Delete command is still queued for the next sync cycle.
        assert_eq!(store.queue_len(), 2);
    }

    #[test]
    fn delete_unknown_task_errors() {
        let (_dir, store) = store();
        assert!(matches!(
            store.delete("ghost", None),
            Err(StoreError::TaskNotFound(_))
        ));
    }

    #[tokio::test]
    async fn get_all_resolves_folder_names_from_snapshot() {
        let (dir, store) = store();
        store.set_folders(vec![Folder::new("f1", "Groceries").unwrap()]);
        let task = store
            .create(NewTask {
                title: "Buy milk".to_string(),
                folder_id: Some("f1".to_string()),
                ..NewTask::default()
            })
            .unwrap();

        let visible = store.get_all(&cache(&dir)).await;
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, task.id);
        assert_eq!(
            visible[0].folder.as_ref().unwrap().name.as_deref(),
            Some("Groceries")
        );
    }

    #[test]
    fn upsert_applies_newer_and_skips_stale() {
        let (_dir, store) = store();
        let base = Task::builder("t1", "Buy milk")
            .build()
            .unwrap()
            .with_last_synced_at(Utc::now());
        assert!(store.upsert(base.clone()));

        // Older incoming row is rejected.
        let stale = Task::builder("t1", "Old title")
            .build()
            .unwrap()
            .with_last_synced_at(base.last_synced_at.unwrap() - chrono::Duration::hours(1));
        assert!(!store.upsert(stale));

        // Same-or-newer incoming row wins.
        let newer = Task::builder("t1", "New title")
            .build()
            .unwrap()
            .with_last_synced_at(base.last_synced_at.unwrap());
        assert!(store.upsert(newer));
        assert_eq!(store.get("t1").unwrap().title, "New title");
    }

    #[test]
    fn remove_commands_preserves_relative_order() {
        let (_dir, store) = store();
        let a = store
            .create(NewTask {
                title: "A".to_string(),
                ..NewTask::default()
            })
            .unwrap();
        let b = store
            .create(NewTask {
                title: "B".to_string(),
                ..NewTask::default()
            })
            .unwrap();
        let c = store
            .create(NewTask {
                title: "C".to_string(),
                ..NewTask::default()
            })
            .unwrap();

        let pending = store.pending_commands();
        store.remove_commands(&HashSet::from([pending[1].command_id.clone()]));

        let remaining: Vec<String> = store
            .pending_commands()
            .iter()
            .map(|cmd| cmd.entity_id.clone())
            .collect();
        assert_eq!(remaining, vec![a.id, c.id]);
        let _ = b;
    }

    #[test]
    fn checkpoint_is_monotonic() {
        let (_dir, store) = store();
        let now = Utc::now();
        store.advance_checkpoint(now);
        store.advance_checkpoint(now - chrono::Duration::hours(1));
        assert_eq!(store.checkpoint(), Some(now));
    }

    #[test]
    fn store_reloads_from_documents() {
        let dir = tempfile::tempdir().unwrap();
        let docs = UserDocuments::new(dir.path(), "u1");
        let task_id = {
            let store = RecordStore::open("u1", docs.clone());
            let task = store
                .create(NewTask {
                    title: "Buy milk".to_string(),
                    ..NewTask::default()
                })
                .unwrap();
            store.write_snapshot().unwrap();
            task.id
        };

        let reloaded = RecordStore::open("u1", docs);
        assert!(reloaded.get(&task_id).is_some());
        // The queued Create survived the restart too.
        assert_eq!(reloaded.queue_len(), 1);
    }
}
