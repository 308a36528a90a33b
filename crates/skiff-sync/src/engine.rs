//! The [`SyncEngine`] facade — wiring and lifecycle.
//!
//! One engine per user session. It owns the record store, the folder
//! cache, the batch persistence worker, and the orchestrator, and exposes
//! the store operations the interactive caller uses plus `sync()` /
//! `close()`. The embedding process constructs it with loaded settings
//! and a remote authority and calls [`SyncEngine::close`] on shutdown —
//! there are no process-wide exit hooks.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{info, instrument};

use skiff_core::Task;
use skiff_remote::RemoteAuthority;
use skiff_settings::SkiffSettings;
use skiff_store::{
    BatchPersistence, FolderCache, FolderRefresh, FolderSource, NewTask, RecordStore, TaskPatch,
    UserDocuments,
};

use crate::errors::{Result, SyncError};
use crate::orchestrator::SyncOrchestrator;
use crate::report::SyncReport;

/// Adapts the remote authority's folder listing to the cache's
/// [`FolderSource`] seam.
struct AuthorityFolderSource {
    user_id: String,
    remote: Arc<dyn RemoteAuthority>,
}

#[async_trait]
impl FolderSource for AuthorityFolderSource {
    async fn fetch_folders(&self) -> anyhow::Result<FolderRefresh> {
        let listing = self.remote.list_folders(&self.user_id).await?;
        Ok(FolderRefresh {
            folders: listing.folders,
            version: listing.version,
        })
    }
}

/// The per-user-session engine facade.
pub struct SyncEngine {
    store: Arc<RecordStore>,
    cache: Arc<FolderCache>,
    persistence: BatchPersistence,
    orchestrator: Arc<SyncOrchestrator>,
    closed: AtomicBool,
}

impl SyncEngine {
    /// Wire up an engine for `user_id`. Must be called inside a tokio
    /// runtime (the persistence worker is spawned here).
    pub fn new(
        user_id: impl Into<String>,
        settings: &SkiffSettings,
        remote: Arc<dyn RemoteAuthority>,
    ) -> Self {
        let user_id = user_id.into();
        let docs = UserDocuments::new(&settings.data_dir, &user_id);

        let store = Arc::new(RecordStore::open(&user_id, docs.clone()));
        let cache = Arc::new(FolderCache::new(
            Duration::from_secs(settings.folder_cache.ttl_secs),
            docs,
            Arc::new(AuthorityFolderSource {
                user_id: user_id.clone(),
                remote: Arc::clone(&remote),
            }),
        ));

        let flush_store = Arc::clone(&store);
        let persistence = BatchPersistence::spawn(
            Duration::from_millis(settings.persistence.debounce_ms),
            Duration::from_millis(settings.persistence.shutdown_grace_ms),
            Arc::new(move || flush_store.write_snapshot()),
        );
        store.attach_persistence(persistence.handle());

        let orchestrator = Arc::new(SyncOrchestrator::new(
            &user_id,
            Arc::clone(&store),
            Arc::clone(&cache),
            remote,
            settings.sync.batch_size,
        ));

        info!(%user_id, "sync engine ready");
        Self {
            store,
            cache,
            persistence,
            orchestrator,
            closed: AtomicBool::new(false),
        }
    }

    /// The underlying record store.
    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    /// The folder cache.
    pub fn folder_cache(&self) -> &Arc<FolderCache> {
        &self.cache
    }

    // ─────────────────────────────────────────────────────────────────────
    // Store operations (optimistic, queued)
    // ─────────────────────────────────────────────────────────────────────

    /// Create a task.
    pub fn create(&self, new: NewTask) -> Result<Task> {
        self.ensure_open()?;
        Ok(self.store.create(new)?)
    }

    /// Update a task with only its actually-changed fields.
    pub fn update(&self, task_id: &str, patch: &TaskPatch) -> Result<Task> {
        self.ensure_open()?;
        Ok(self.store.update(task_id, patch)?)
    }

    /// Delete a task (immediate local tombstone).
    pub fn delete(&self, task_id: &str, reason: Option<String>) -> Result<()> {
        self.ensure_open()?;
        Ok(self.store.delete(task_id, reason)?)
    }

    /// Projected view of all visible tasks.
    pub async fn get_all(&self) -> Vec<Task> {
        self.store.get_all(&self.cache).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Sync
    // ─────────────────────────────────────────────────────────────────────

    /// Start a sync cycle on a background worker.
    ///
    /// Returns immediately; the interactive caller never blocks on network
    /// I/O. A request while a cycle is running resolves to a coalesced
    /// no-op report.
    pub fn sync(&self) -> JoinHandle<Result<SyncReport>> {
        let orchestrator = Arc::clone(&self.orchestrator);
        tokio::spawn(async move { orchestrator.run().await })
    }

    /// Run a sync cycle and wait for it.
    pub async fn sync_now(&self) -> Result<SyncReport> {
        self.ensure_open()?;
        self.orchestrator.run().await
    }

    /// Force an immediate durable flush of the entity store.
    pub fn flush_now(&self) -> Result<()> {
        Ok(self.persistence.flush_now()?)
    }

    /// Flush and stop the background worker. Idempotent-ish: a second
    /// call reports [`SyncError::Closed`].
    #[instrument(skip(self))]
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Err(SyncError::Closed);
        }
        self.persistence.shutdown().await?;
        info!("sync engine closed");
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SyncError::Closed);
        }
        Ok(())
    }
}
