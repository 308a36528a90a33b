//! # skiff-settings
//!
//! Configuration management with layered sources for the Skiff engine.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`SkiffSettings::default()`]
//! 2. **User file** — `~/.skiff/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `SKIFF_*` overrides (highest priority)
//!
//! The engine is a library, so there is no process-global singleton here:
//! the embedding process loads a [`SkiffSettings`] once and hands it to
//! `SyncEngine`.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
