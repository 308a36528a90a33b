//! Settings loading: defaults → JSON file deep-merge → env overrides.

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::SkiffSettings;

/// Default settings file location (`~/.skiff/settings.json`).
pub fn settings_path() -> PathBuf {
    SkiffSettings::default().data_dir.join("settings.json")
}

/// Load settings from the default path with env overrides applied.
///
/// A missing file is not an error — compiled defaults are used.
pub fn load_settings() -> Result<SkiffSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific file path.
///
/// The file's JSON is deep-merged over the serialized defaults, so a
/// partial file only overrides the keys it names. `SKIFF_*` environment
/// variables are applied last, then [`SkiffSettings::validate`] clamps
/// anything out of range.
pub fn load_settings_from_path(path: &Path) -> Result<SkiffSettings> {
    let defaults = serde_json::to_value(SkiffSettings::default())?;

    let merged = if path.exists() {
        let raw = std::fs::read_to_string(path)?;
        let file_value: Value = serde_json::from_str(&raw)?;
        debug!(?path, "settings file loaded");
        deep_merge(defaults, file_value)
    } else {
        debug!(?path, "no settings file, using defaults");
        defaults
    };

    let mut settings: SkiffSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    settings.validate();
    Ok(settings)
}

/// Deep-merge `overlay` onto `base`.
///
/// Objects merge recursively; any other value in `overlay` replaces the
/// base value wholesale.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                let _ = base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

fn apply_env_overrides(settings: &mut SkiffSettings) {
    if let Ok(dir) = std::env::var("SKIFF_DATA_DIR") {
        settings.data_dir = PathBuf::from(dir);
    }
    if let Ok(endpoint) = std::env::var("SKIFF_SYNC_ENDPOINT") {
        settings.sync.endpoint = endpoint;
    }
    override_parsed(&mut settings.sync.batch_size, "SKIFF_SYNC_BATCH_SIZE");
    override_parsed(
        &mut settings.persistence.debounce_ms,
        "SKIFF_PERSIST_DEBOUNCE_MS",
    );
    override_parsed(&mut settings.folder_cache.ttl_secs, "SKIFF_FOLDER_TTL_SECS");
}

fn override_parsed<T: std::str::FromStr>(slot: &mut T, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => warn!(%var, %raw, "ignoring unparseable env override"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
