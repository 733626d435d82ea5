//! HTTP client for the backend's login and session endpoints.

use std::time::Duration;

use couch_core::{SessionId, SessionIdentity};
use reqwest::{Response, StatusCode};
use url::Url;

use crate::errors::AuthError;
use crate::types::{
    LoginRequest, LoginResponse, NewSessionResponse, SessionListResponse, SessionSummary,
};

/// Thin client over the backend's HTTP API.
#[derive(Clone, Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
}

impl BackendClient {
    /// Create a client for `base` with a per-request timeout.
    pub fn new(mut base: Url, timeout: Duration) -> Result<Self, AuthError> {
        // Url::join drops the last segment unless the path ends in '/'
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base })
    }

    /// Base URL requests are resolved against.
    pub fn base(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        Ok(self.base.join(path)?)
    }

    /// Exchange credentials for a bearer token and user identity.
    ///
    /// A non-2xx answer is returned as [`AuthError::Backend`] carrying the
    /// response body as the failure reason.
    #[tracing::instrument(skip_all, fields(username = %username))]
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionIdentity, AuthError> {
        if username.is_empty() {
            return Err(AuthError::MissingCredentials("username"));
        }
        if password.is_empty() {
            return Err(AuthError::MissingCredentials("password"));
        }

        let resp = self
            .http
            .post(self.endpoint("login")?)
            .json(&LoginRequest { username, password })
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        let data: LoginResponse = resp.json().await?;
        tracing::info!(user_id = %data.id, "logged in");
        Ok(data.into())
    }

    /// Create a new session record and return its identifier.
    #[tracing::instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn create_session(&self, identity: &SessionIdentity) -> Result<SessionId, AuthError> {
        let resp = self
            .http
            .post(self.endpoint("sessions/new")?)
            .bearer_auth(&identity.token)
            .json(&serde_json::json!({}))
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        let data: NewSessionResponse = resp.json().await?;
        tracing::info!(session_id = %data.session_id, "session created");
        Ok(SessionId::from(data.session_id))
    }

    /// List the user's sessions.
    #[tracing::instrument(skip_all, fields(user_id = %identity.user_id))]
    pub async fn list_sessions(
        &self,
        identity: &SessionIdentity,
    ) -> Result<Vec<SessionSummary>, AuthError> {
        let resp = self
            .http
            .get(self.endpoint("sessions")?)
            .bearer_auth(&identity.token)
            .send()
            .await?;
        let resp = ensure_success(resp).await?;

        let data: SessionListResponse = resp.json().await?;
        tracing::debug!(count = data.sessions.len(), "sessions listed");
        Ok(data.sessions)
    }
}

async fn ensure_success(resp: Response) -> Result<Response, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let text = resp.text().await.unwrap_or_default();
    if status == StatusCode::UNAUTHORIZED {
        tracing::warn!("backend rejected credentials");
    }
    Err(AuthError::Backend {
        status: status.as_u16(),
        message: text,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
