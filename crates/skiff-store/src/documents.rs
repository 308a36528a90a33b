//! Durable per-user documents and the tabular entity encoding.
//!
//! Three JSON documents per user live under the data directory:
//!
//! - `tasks.json` — [`TaskDocument`]: column list + row list (tabular
//!   encoding of tasks), the sync checkpoint, and a folder snapshot
//! - `queue.json` — [`QueueDocument`]: the ordered pending-command list
//! - `folders.json` — [`FolderCacheDocument`]: the reference cache
//!
//! Writes go through a temp file + rename so a crash mid-write never
//! leaves a truncated document. Loads tolerate damage: a document that
//! fails to parse, or whose column set lacks `id`, is reported as empty
//! state with a warning — the engine then falls back to the bootstrap
//! fetch path instead of refusing to start.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use skiff_core::{Command, Folder, Task, fields};

use crate::errors::Result;

/// Column order for the tabular task encoding.
const TASK_COLUMNS: &[&str] = &[
    fields::ID,
    fields::TITLE,
    fields::DESCRIPTION,
    fields::STATUS,
    fields::SYNC_MARKER,
    fields::DUE_AT,
    fields::CREATED_AT,
    fields::UPDATED_AT,
    fields::DELETED_AT,
    fields::LAST_SYNCED_AT,
    fields::FOLDER_ID,
    fields::FOLDER_NAME,
    fields::METADATA,
];

/// Durable entity-store document: tabular tasks + checkpoint + folders.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TaskDocument {
    /// Field names, one per cell position.
    pub columns: Vec<String>,
    /// One row of cells per task, zipped against `columns` on load.
    pub rows: Vec<Vec<Value>>,
    /// Last successful sync timestamp.
    pub sync_checkpoint: Option<DateTime<Utc>>,
    /// Folder snapshot for offline name resolution.
    pub folders: Vec<Folder>,
}

/// Durable pending-command queue document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QueueDocument {
    /// Commands in queue order.
    pub commands: Vec<Command>,
}

/// Durable folder reference cache document.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderCacheDocument {
    /// Cached folder records.
    pub records: Vec<Folder>,
    /// When the cache was last refreshed from the authority.
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// Opaque version token reported by the authority.
    pub version: Option<String>,
}

/// Decoded in-memory state of a [`TaskDocument`].
#[derive(Clone, Debug, Default)]
pub struct TaskStoreState {
    /// Reconstructed tasks, in row order.
    pub tasks: Vec<Task>,
    /// Sync checkpoint.
    pub sync_checkpoint: Option<DateTime<Utc>>,
    /// Folder snapshot.
    pub folders: Vec<Folder>,
}

/// Paths and codecs for one user's documents.
#[derive(Clone, Debug)]
pub struct UserDocuments {
    dir: PathBuf,
}

impl UserDocuments {
    /// Documents for `user_id` under `data_dir`.
    pub fn new(data_dir: &Path, user_id: &str) -> Self {
        Self {
            dir: data_dir.join(user_id),
        }
    }

    /// Path of the entity-store document.
    pub fn tasks_path(&self) -> PathBuf {
        self.dir.join("tasks.json")
    }

    /// Path of the command-queue document.
    pub fn queue_path(&self) -> PathBuf {
        self.dir.join("queue.json")
    }

    /// Path of the folder-cache document.
    pub fn folder_cache_path(&self) -> PathBuf {
        self.dir.join("folders.json")
    }

    /// Load and decode the entity store. Malformed → empty state.
    pub fn load_tasks(&self) -> TaskStoreState {
        let Some(doc) = self.load_document::<TaskDocument>(&self.tasks_path()) else {
            return TaskStoreState::default();
        };
        decode_task_document(&doc)
    }

    /// Encode and atomically write the entity store.
    pub fn write_tasks(
        &self,
        tasks: &[Task],
        sync_checkpoint: Option<DateTime<Utc>>,
        folders: &[Folder],
    ) -> Result<()> {
        let doc = encode_task_document(tasks, sync_checkpoint, folders);
        self.write_document(&self.tasks_path(), &doc)
    }

    /// Load the command queue. Malformed → empty queue.
    pub fn load_queue(&self) -> Vec<Command> {
        self.load_document::<QueueDocument>(&self.queue_path())
            .map(|doc| doc.commands)
            .unwrap_or_default()
    }

    /// Atomically rewrite the full command queue.
    pub fn write_queue(&self, commands: &[Command]) -> Result<()> {
        let doc = QueueDocument {
            commands: commands.to_vec(),
        };
        self.write_document(&self.queue_path(), &doc)
    }

    /// Load the folder cache. Malformed → empty cache.
    pub fn load_folder_cache(&self) -> FolderCacheDocument {
        self.load_document(&self.folder_cache_path())
            .unwrap_or_default()
    }

    /// Atomically write the folder cache.
    pub fn write_folder_cache(&self, doc: &FolderCacheDocument) -> Result<()> {
        self.write_document(&self.folder_cache_path(), doc)
    }

    fn load_document<T: serde::de::DeserializeOwned>(&self, path: &Path) -> Option<T> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(?path, "document not found, starting empty");
                return None;
            }
            Err(error) => {
                warn!(?path, %error, "failed to read document, treating as empty");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(doc) => Some(doc),
            Err(error) => {
                warn!(?path, %error, "malformed document, treating as empty");
                None
            }
        }
    }

    fn write_document<T: Serialize>(&self, path: &Path, doc: &T) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(doc)?)?;
        fs::rename(&tmp, path)?;
        debug!(?path, "document written");
        Ok(())
    }
}

/// Encode tasks into the tabular document.
fn encode_task_document(
    tasks: &[Task],
    sync_checkpoint: Option<DateTime<Utc>>,
    folders: &[Folder],
) -> TaskDocument {
    let columns: Vec<String> = TASK_COLUMNS.iter().map(ToString::to_string).collect();
    let rows = tasks
        .iter()
        .map(|task| {
            let mut cells = task.to_fields();
            let _ = cells.insert(fields::ID.to_string(), Value::from(task.id.clone()));
            columns
                .iter()
                .map(|column| cells.remove(column).unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    TaskDocument {
        columns,
        rows,
        sync_checkpoint,
        folders: folders.to_vec(),
    }
}

/// Decode a tabular document by zipping columns with row cells.
///
/// Absent or null cells are skipped; rows missing an id, and rows whose
/// field set fails entity validation, are dropped with a warning. A
/// document without an `id` column at all is treated as malformed (empty
/// state) — it cannot name a single entity, so pretending it is merely
/// sparse would mask data loss.
fn decode_task_document(doc: &TaskDocument) -> TaskStoreState {
    if !doc.rows.is_empty() && !doc.columns.iter().any(|c| c == fields::ID) {
        warn!("task document has no id column, treating as empty");
        return TaskStoreState::default();
    }

    let mut tasks = Vec::with_capacity(doc.rows.len());
    for row in &doc.rows {
        let mut cells: BTreeMap<String, Value> = BTreeMap::new();
        for (column, cell) in doc.columns.iter().zip(row) {
            if !cell.is_null() {
                let _ = cells.insert(column.clone(), cell.clone());
            }
        }
        let Some(id) = cells.remove(fields::ID).and_then(|v| match v {
            Value::String(id) if !id.trim().is_empty() => Some(id),
            _ => None,
        }) else {
            warn!("skipping task row without an id cell");
            continue;
        };
        match Task::from_fields(&id, &cells) {
            Ok(task) => tasks.push(task),
            Err(error) => warn!(%id, %error, "skipping undecodable task row"),
        }
    }

    TaskStoreState {
        tasks,
        sync_checkpoint: doc.sync_checkpoint,
        folders: doc.folders.clone(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(unused_results)]
mod tests {
    use super::*;
    use skiff_core::{CommandKind, SyncMarker, TaskStatus};

    fn docs() -> (tempfile::TempDir, UserDocuments) {
        let dir = tempfile::tempdir().unwrap();
        let docs = UserDocuments::new(dir.path(), "u1");
        (dir, docs)
    }

    fn sample_tasks() -> Vec<Task> {
        vec![
            Task::builder("t1", "Buy milk")
                .description("two liters")
                .status(TaskStatus::InProgress)
                .folder("f1", Some("Groceries".to_string()))
                .build()
                .unwrap()
                .with_sync_marker(SyncMarker::Cloud),
            Task::builder("t2", "Call the bank").build().unwrap(),
        ]
    }

    #[test]
    fn tasks_round_trip_through_tabular_document() {
        let (_dir, docs) = docs();
        let folders = vec![Folder::new("f1", "Groceries").unwrap()];
        let checkpoint = Some(Utc::now());
        docs.write_tasks(&sample_tasks(), checkpoint, &folders).unwrap();

        let state = docs.load_tasks();
        assert_eq!(state.tasks.len(), 2);
        assert_eq!(state.sync_checkpoint, checkpoint);
        assert_eq!(state.folders.len(), 1);

        let t1 = &state.tasks[0];
        assert_eq!(t1.id, "t1");
        assert_eq!(t1.title, "Buy milk");
        assert_eq!(t1.status, TaskStatus::InProgress);
        assert_eq!(t1.sync_marker, SyncMarker::Cloud);
        assert_eq!(t1.folder.as_ref().unwrap().id, "f1");
        assert_eq!(t1.folder.as_ref().unwrap().name.as_deref(), Some("Groceries"));
    }

    #[test]
    fn missing_document_loads_as_empty() {
        let (_dir, docs) = docs();
        let state = docs.load_tasks();
        assert!(state.tasks.is_empty());
        assert!(state.sync_checkpoint.is_none());
    }

    #[test]
    fn malformed_document_loads_as_empty() {
        let (_dir, docs) = docs();
        fs::create_dir_all(docs.tasks_path().parent().unwrap()).unwrap();
        fs::write(docs.tasks_path(), "{{not json").unwrap();
        assert!(docs.load_tasks().tasks.is_empty());
    }

    #[test]
    fn document_without_id_column_loads_as_empty() {
        let (_dir, docs) = docs();
        let doc = TaskDocument {
            columns: vec!["title".to_string()],
            rows: vec![vec![Value::from("orphan")]],
            sync_checkpoint: None,
            folders: vec![],
        };
        fs::create_dir_all(docs.tasks_path().parent().unwrap()).unwrap();
        fs::write(docs.tasks_path(), serde_json::to_vec(&doc).unwrap()).unwrap();
        assert!(docs.load_tasks().tasks.is_empty());
    }

    #[test]
    fn unknown_columns_are_skipped_not_fatal() {
        let (_dir, docs) = docs();
        let doc = TaskDocument {
            columns: vec![
                "id".to_string(),
                "title".to_string(),
                "someFutureColumn".to_string(),
            ],
            rows: vec![vec![
                Value::from("t1"),
                Value::from("Buy milk"),
                Value::from(42),
            ]],
            sync_checkpoint: None,
            folders: vec![],
        };
        fs::create_dir_all(docs.tasks_path().parent().unwrap()).unwrap();
        fs::write(docs.tasks_path(), serde_json::to_vec(&doc).unwrap()).unwrap();

        let state = docs.load_tasks();
        assert_eq!(state.tasks.len(), 1);
        assert_eq!(state.tasks[0].title, "Buy milk");
    }

    #[test]
    fn queue_round_trips() {
        let (_dir, docs) = docs();
        let commands = vec![
            Command::new("u1", "t1", CommandKind::Delete { reason: None }),
            Command::new(
                "u1",
                "t2",
                CommandKind::Update {
                    changed_fields: BTreeMap::new(),
                },
            ),
        ];
        docs.write_queue(&commands).unwrap();
        assert_eq!(docs.load_queue(), commands);
    }

    #[test]
    fn folder_cache_round_trips() {
        let (_dir, docs) = docs();
        let doc = FolderCacheDocument {
            records: vec![Folder::new("f1", "Groceries").unwrap()],
            last_refreshed_at: Some(Utc::now()),
            version: Some("v7".to_string()),
        };
        docs.write_folder_cache(&doc).unwrap();
        let loaded = docs.load_folder_cache();
        assert_eq!(loaded.records.len(), 1);
        assert_eq!(loaded.version.as_deref(), Some("v7"));
    }
}
