//! Wire types for the backend's HTTP API.
//!
//! The backend issues integer ids; a few deployments send strings. Both are
//! accepted and normalized to strings.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use couch_core::{SessionId, SessionIdentity};

/// An id that may arrive as a JSON number or string.
#[derive(Deserialize)]
#[serde(untagged)]
enum WireId {
    Num(i64),
    Str(String),
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Num(n) => n.to_string(),
            WireId::Str(s) => s,
        }
    }
}

fn deserialize_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    WireId::deserialize(deserializer).map(String::from)
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<WireId>::deserialize(deserializer).map(|id| id.map(String::from))
}

/// `POST /login` request body.
#[derive(Serialize)]
pub(crate) struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// `POST /login` response body.
#[derive(Clone, Debug, Deserialize)]
pub struct LoginResponse {
    /// Bearer token.
    pub access_token: String,
    /// User's first name, if the profile has one.
    #[serde(default)]
    pub first_name: Option<String>,
    /// Backend user id.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
}

impl From<LoginResponse> for SessionIdentity {
    fn from(resp: LoginResponse) -> Self {
        SessionIdentity::new(resp.access_token, resp.id, resp.first_name.unwrap_or_default())
    }
}

/// `POST /sessions/new` response body.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct NewSessionResponse {
    #[serde(deserialize_with = "deserialize_id")]
    pub session_id: String,
}

/// `GET /sessions` response body.
#[derive(Clone, Debug, Deserialize)]
pub(crate) struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
}

/// One past or ongoing session as listed by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SessionSummary {
    /// Session identifier.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    /// Owning user.
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub user_id: Option<String>,
    /// Assigned counterpart.
    #[serde(default, deserialize_with = "deserialize_opt_id")]
    pub therapist_id: Option<String>,
    /// Start time as sent by the backend.
    #[serde(default)]
    pub start_time: Option<String>,
    /// End time, absent while the session is ongoing.
    #[serde(default)]
    pub end_time: Option<String>,
}

impl SessionSummary {
    /// The session id in channel form.
    pub fn session_id(&self) -> SessionId {
        SessionId::from(self.id.clone())
    }

    /// Parsed start time. Naive timestamps are taken as UTC.
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.start_time.as_deref().and_then(parse_timestamp)
    }

    /// Parsed end time. Naive timestamps are taken as UTC.
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.end_time.as_deref().and_then(parse_timestamp)
    }

    /// Whether the backend has recorded an end time.
    pub fn is_finished(&self) -> bool {
        self.end_time.is_some()
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
