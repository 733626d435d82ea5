//! Chat message types.
//!
//! A [`ChatMessage`] is immutable once built. On the wire the counterpart is
//! spelled `"therapist"`; in code it is [`Sender::Counterpart`].

use std::fmt;

use serde::{Deserialize, Serialize};

/// Who authored a chat message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sender {
    /// The local, authenticated user.
    #[serde(rename = "user")]
    User,
    /// The remote party of the session.
    #[serde(rename = "therapist")]
    Counterpart,
}

impl Sender {
    /// Wire spelling of the sender.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Counterpart => "therapist",
        }
    }
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a chat transcript.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    sender: Sender,
    text: String,
}

impl ChatMessage {
    /// Build a message from its parts.
    #[must_use]
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            sender,
            text: text.into(),
        }
    }

    /// A message authored by the local user.
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    /// A message authored by the counterpart.
    #[must_use]
    pub fn counterpart(text: impl Into<String>) -> Self {
        Self::new(Sender::Counterpart, text)
    }

    /// Author of the message.
    pub fn sender(&self) -> Sender {
        self.sender
    }

    /// Message body.
    pub fn text(&self) -> &str {
        &self.text
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
