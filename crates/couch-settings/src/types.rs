//! Settings types.
//!
//! Field names are camelCase on disk (`~/.couch/settings.json`). Every struct
//! is `#[serde(default)]` so a partial file only overrides what it names.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::errors::{Result, SettingsError};

/// Root settings object.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CouchSettings {
    /// Backend HTTP and WebSocket endpoints.
    pub backend: BackendSettings,
    /// Session channel tuning.
    pub channel: ChannelSettings,
    /// Log output.
    pub logging: LoggingSettings,
}

/// Where the backend lives.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendSettings {
    /// Base URL of the HTTP API (login, sessions).
    pub base_url: String,
    /// Base URL of the real-time endpoint. Derived from `base_url` when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ws_url: Option<String>,
    /// HTTP request timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            ws_url: None,
            request_timeout_ms: 10_000,
        }
    }
}

impl BackendSettings {
    /// Parsed HTTP base URL.
    pub fn http_base(&self) -> Result<Url> {
        Url::parse(&self.base_url)
            .map_err(|e| SettingsError::InvalidValue(format!("baseUrl {}: {e}", self.base_url)))
    }

    /// Real-time base URL: `ws_url` if configured, otherwise `base_url` with
    /// `http` swapped for `ws` (`https` for `wss`).
    pub fn websocket_base(&self) -> Result<Url> {
        if let Some(ws) = &self.ws_url {
            return Url::parse(ws)
                .map_err(|e| SettingsError::InvalidValue(format!("wsUrl {ws}: {e}")));
        }
        let mut url = self.http_base()?;
        let scheme = match url.scheme() {
            "https" | "wss" => "wss",
            "http" | "ws" => "ws",
            other => {
                return Err(SettingsError::InvalidValue(format!(
                    "baseUrl scheme {other} has no websocket counterpart"
                )));
            }
        };
        url.set_scheme(scheme).map_err(|()| {
            SettingsError::InvalidValue(format!("cannot switch {} to {scheme}", self.base_url))
        })?;
        Ok(url)
    }
}

/// Session channel timing and buffer sizes.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ChannelSettings {
    /// How long a channel may stay in `Connecting`/`AwaitingAuth`. `0` waits forever.
    pub handshake_timeout_ms: u64,
    /// How long a `Closing` channel waits for the transport to confirm teardown.
    pub close_grace_ms: u64,
    /// Capacity of the outbound frame queue.
    pub outbound_queue: usize,
    /// Capacity of the update broadcast per subscriber.
    pub update_buffer: usize,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 30_000,
            close_grace_ms: 5_000,
            outbound_queue: 64,
            update_buffer: 256,
        }
    }
}

/// Log output settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of the compact human format.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
