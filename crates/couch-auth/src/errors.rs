//! Auth error types.

/// Errors that can occur while talking to the backend's HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// HTTP request failed before a response arrived.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The backend answered with a non-2xx status. `message` is the raw body.
    #[error("backend error ({status}): {message}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Response body as returned by the backend.
        message: String,
    },

    /// Username or password was empty.
    #[error("missing credentials: {0}")]
    MissingCredentials(&'static str),

    /// The backend URL could not be joined with an endpoint path.
    #[error("invalid backend URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// No identity is stored (not logged in).
    #[error("not logged in")]
    NotLoggedIn,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
