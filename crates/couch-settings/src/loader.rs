//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`CouchSettings::default()`]
//! 2. If `~/.couch/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `COUCH_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::CouchSettings;

/// Resolve the path to the settings file (`~/.couch/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".couch").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<CouchSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<CouchSettings> {
    let mut settings = read_settings_file(path)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Defaults deep-merged with the file at `path`, without env overrides.
pub fn read_settings_file(path: &Path) -> Result<CouchSettings> {
    let defaults = serde_json::to_value(CouchSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    Ok(serde_json::from_value(merged)?)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut CouchSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

/// Apply overrides from an arbitrary lookup. Split out so tests need not
/// touch the process environment.
pub fn apply_overrides<F>(settings: &mut CouchSettings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let read_string = |name: &str| lookup(name).filter(|v| !v.is_empty());
    let read_u64 = |name: &str, min: u64, max: u64| {
        let val = lookup(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
        }
        result
    };
    let read_bool = |name: &str| {
        let val = lookup(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    };

    // ── Backend ─────────────────────────────────────────────────────
    if let Some(v) = read_string("COUCH_BACKEND_URL") {
        settings.backend.base_url = v;
    }
    if let Some(v) = read_string("COUCH_WS_URL") {
        settings.backend.ws_url = Some(v);
    }
    if let Some(v) = read_u64("COUCH_REQUEST_TIMEOUT_MS", 100, 600_000) {
        settings.backend.request_timeout_ms = v;
    }

    // ── Channel ─────────────────────────────────────────────────────
    if let Some(v) = read_u64("COUCH_HANDSHAKE_TIMEOUT_MS", 0, 3_600_000) {
        settings.channel.handshake_timeout_ms = v;
    }
    if let Some(v) = read_u64("COUCH_CLOSE_GRACE_MS", 0, 600_000) {
        settings.channel.close_grace_ms = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = read_string("COUCH_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = read_bool("COUCH_LOG_JSON") {
        settings.logging.json = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
