//! # couch-settings
//!
//! Configuration for the Couch session client.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`CouchSettings::default()`]
//! 2. **User file**: `~/.couch/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `COUCH_*` overrides (highest priority)
//!
//! There is no global instance: the binary loads settings once and passes the
//! relevant sections down.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::{BackendSettings, ChannelSettings, CouchSettings, LoggingSettings};

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
