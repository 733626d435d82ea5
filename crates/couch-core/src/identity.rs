//! Session identity and session identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a chat session, as assigned by the backend.
///
/// The backend hands out numeric ids; they are kept as strings since the
/// client only ever uses them as a path segment.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Return the inner string as a slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the id is empty or whitespace only.
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::ops::Deref for SessionId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for SessionId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// The bearer token and user details obtained from login.
///
/// Passed explicitly to whatever opens a channel; never stored globally.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIdentity {
    /// Opaque bearer token.
    pub token: String,
    /// Backend user id.
    pub user_id: String,
    /// Display name used for greetings.
    pub first_name: String,
}

impl SessionIdentity {
    /// Build an identity from its parts.
    #[must_use]
    pub fn new(
        token: impl Into<String>,
        user_id: impl Into<String>,
        first_name: impl Into<String>,
    ) -> Self {
        Self {
            token: token.into(),
            user_id: user_id.into(),
            first_name: first_name.into(),
        }
    }

    /// Whether the token can be used to open a channel.
    #[must_use]
    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }
}

impl fmt::Debug for SessionIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentity")
            .field("token", &"[redacted]")
            .field("user_id", &self.user_id)
            .field("first_name", &self.first_name)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_token() {
        let id = SessionIdentity::new("secret-token", "7", "Ada");
        let dbg = format!("{id:?}");
        assert!(!dbg.contains("secret-token"));
        assert!(dbg.contains("[redacted]"));
        assert!(dbg.contains("Ada"));
    }

    #[test]
    fn blank_token_is_unusable() {
        assert!(!SessionIdentity::new("", "1", "A").has_token());
        assert!(!SessionIdentity::new("   ", "1", "A").has_token());
        assert!(SessionIdentity::new("t", "1", "A").has_token());
    }

    #[test]
    fn session_id_blank() {
        assert!(SessionId::from("").is_blank());
        assert!(SessionId::from(" \t").is_blank());
        assert!(!SessionId::from("12").is_blank());
    }

    #[test]
    fn session_id_is_transparent() {
        let id = SessionId::from("12");
        assert_eq!(serde_json::to_string(&id).unwrap(), r#""12""#);
        assert_eq!(id.to_string(), "12");
    }
}
