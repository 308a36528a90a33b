//! TTL- and version-gated cache for folder lookup data.
//!
//! Folder metadata changes far less often than tasks, so lookups are
//! served from this cache and a refresh is only attempted when the cache
//! age exceeds the TTL. Refresh failures are swallowed — stale data beats
//! an error on a read path — and the version token lets the orchestrator
//! decide whether a full refetch is owed at all.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{info, warn};

use skiff_core::Folder;

use crate::documents::{FolderCacheDocument, UserDocuments};
use crate::errors::Result;

/// A fresh folder listing pulled from the remote authority.
#[derive(Clone, Debug)]
pub struct FolderRefresh {
    /// Full folder record set.
    pub folders: Vec<Folder>,
    /// Opaque version token for the listing.
    pub version: Option<String>,
}

/// Source of folder refreshes.
///
/// Implemented over the remote authority by the sync crate; the cache only
/// needs "give me the current listing" and swallows any failure.
#[async_trait]
pub trait FolderSource: Send + Sync {
    /// Fetch the current folder listing.
    async fn fetch_folders(&self) -> anyhow::Result<FolderRefresh>;
}

struct CacheInner {
    by_id: HashMap<String, Folder>,
    last_refreshed_at: Option<DateTime<Utc>>,
    version: Option<String>,
}

/// The folder reference cache for one user.
pub struct FolderCache {
    ttl: Duration,
    docs: UserDocuments,
    source: Arc<dyn FolderSource>,
    inner: Mutex<CacheInner>,
}

impl FolderCache {
    /// Build the cache, loading any persisted contents.
    pub fn new(ttl: Duration, docs: UserDocuments, source: Arc<dyn FolderSource>) -> Self {
        let persisted = docs.load_folder_cache();
        let by_id = persisted
            .records
            .into_iter()
            .map(|f| (f.id.clone(), f))
            .collect();
        Self {
            ttl,
            docs,
            source,
            inner: Mutex::new(CacheInner {
                by_id,
                last_refreshed_at: persisted.last_refreshed_at,
                version: persisted.version,
            }),
        }
    }

    /// Look up a folder by id, refreshing first if the cache is stale.
    ///
    /// Returns `None` for a missing id or an unknown folder. A failed
    /// refresh is swallowed and the stale contents are used.
    pub async fn get(&self, id: Option<&str>) -> Option<Folder> {
        let id = id?;
        self.refresh_if_stale().await;
        self.inner.lock().by_id.get(id).cloned()
    }

    /// Non-refreshing name lookup.
    pub fn name_of(&self, id: &str) -> Option<String> {
        self.inner.lock().by_id.get(id).map(|f| f.name.clone())
    }

    /// Whether the cache holds no records.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().by_id.is_empty()
    }

    /// Whether the stored version token equals `version`.
    pub fn has_version(&self, version: &str) -> bool {
        self.inner.lock().version.as_deref() == Some(version)
    }

    /// Whether the cache has never been refreshed or has outlived its TTL.
    pub fn is_stale(&self) -> bool {
        let inner = self.inner.lock();
        match inner.last_refreshed_at {
            None => true,
            Some(at) => {
                let age = Utc::now().signed_duration_since(at);
                age.to_std().map_or(true, |age| age > self.ttl)
            }
        }
    }

    /// Refresh from the source if stale; failures are swallowed.
    pub async fn refresh_if_stale(&self) {
        if !self.is_stale() {
            return;
        }
        match self.source.fetch_folders().await {
            Ok(refresh) => {
                if let Err(error) = self.update(refresh.folders, refresh.version) {
                    warn!(%error, "failed to persist refreshed folder cache");
                }
            }
            Err(error) => {
                warn!(%error, "folder refresh failed, serving stale cache");
            }
        }
    }

    /// Atomically replace the cache contents and persist them.
    pub fn update(&self, folders: Vec<Folder>, version: Option<String>) -> Result<()> {
        let now = Utc::now();
        let document = FolderCacheDocument {
            records: folders.clone(),
            last_refreshed_at: Some(now),
            version: version.clone(),
        };
        {
            let mut inner = self.inner.lock();
            inner.by_id = folders.into_iter().map(|f| (f.id.clone(), f)).collect();
            inner.last_refreshed_at = Some(now);
            inner.version = version;
        }
        self.docs.write_folder_cache(&document)?;
        info!(records = document.records.len(), "folder cache updated");
        Ok(())
    }

    /// Current version token, if any.
    pub fn version(&self) -> Option<String> {
        self.inner.lock().version.clone()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
