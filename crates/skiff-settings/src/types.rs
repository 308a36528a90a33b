//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`
//! so a partial JSON file deep-merges over compiled defaults — missing
//! fields get production default values during deserialization.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root settings type for the Skiff engine.
///
/// Loaded from `~/.skiff/settings.json` with defaults applied for missing
/// fields; `SKIFF_*` environment variables override specific values.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkiffSettings {
    /// Settings schema version.
    pub version: String,
    /// Directory holding the per-user durable documents.
    pub data_dir: PathBuf,
    /// Batch persistence behavior.
    pub persistence: PersistenceSettings,
    /// Folder reference cache behavior.
    pub folder_cache: FolderCacheSettings,
    /// Sync orchestrator and remote endpoint behavior.
    pub sync: SyncSettings,
}

impl Default for SkiffSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            data_dir: default_data_dir(),
            persistence: PersistenceSettings::default(),
            folder_cache: FolderCacheSettings::default(),
            sync: SyncSettings::default(),
        }
    }
}

impl SkiffSettings {
    /// Correct invalid values in place rather than rejecting them.
    ///
    /// Out-of-range values are clamped with a warning so users get working
    /// behavior instead of a confusing startup error.
    pub fn validate(&mut self) {
        if self.sync.batch_size == 0 {
            tracing::warn!("sync.batchSize of 0 clamped to 1");
            self.sync.batch_size = 1;
        }
        if self.folder_cache.ttl_secs == 0 {
            tracing::warn!("folderCache.ttlSecs of 0 clamped to 1");
            self.folder_cache.ttl_secs = 1;
        }
    }
}

/// Batch persistence (debounced flush) settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistenceSettings {
    /// Debounce window between a scheduled write and the flush.
    pub debounce_ms: u64,
    /// Bounded wait for in-flight work during shutdown before force-abort.
    pub shutdown_grace_ms: u64,
}

impl Default for PersistenceSettings {
    fn default() -> Self {
        Self {
            debounce_ms: 2_000,
            shutdown_grace_ms: 5_000,
        }
    }
}

/// Folder reference cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FolderCacheSettings {
    /// Maximum cache age before a read triggers a refresh.
    pub ttl_secs: u64,
}

impl Default for FolderCacheSettings {
    fn default() -> Self {
        Self { ttl_secs: 3_600 }
    }
}

/// Sync orchestrator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Base URL of the remote authority.
    pub endpoint: String,
    /// Commands submitted per bulk request.
    pub batch_size: usize,
    /// Per-request timeout for remote calls.
    pub request_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8787".to_string(),
            batch_size: 50,
            request_timeout_secs: 30,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var_os("HOME").map_or_else(|| PathBuf::from(".skiff"), |home| {
        PathBuf::from(home).join(".skiff")
    })
}
