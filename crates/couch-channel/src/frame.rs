//! Wire frames exchanged over a session channel.
//!
//! Outbound frames are small JSON objects. Inbound frames are either one of
//! two literal auth acknowledgements (not JSON) or a JSON envelope of chat
//! messages.

use couch_core::{ChannelError, ChatMessage};
use serde::Deserialize;
use serde_json::json;

/// Literal sent by the peer when the token is accepted.
pub const AUTH_ACCEPTED: &str = "Valid token";

/// Literal sent by the peer when the token is rejected.
pub const AUTH_REJECTED: &str = "Invalid token";

/// A decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Token accepted.
    AuthAccepted,
    /// Token rejected.
    AuthRejected,
    /// Chat messages in arrival order.
    Envelope(Vec<ChatMessage>),
}

#[derive(Deserialize)]
struct Envelope {
    messages: Vec<ChatMessage>,
}

/// Build the authentication frame: `{"access_token": "<token>"}`.
pub fn auth_frame(token: &str) -> String {
    json!({ "access_token": token }).to_string()
}

/// Build an outbound chat frame: `{"message": "<text>"}`.
pub fn chat_frame(text: &str) -> String {
    json!({ "message": text }).to_string()
}

/// Decode an inbound text frame.
///
/// The acknowledgements are matched after trimming whitespace, and also in
/// their JSON-string form (`"Valid token"`). Anything else must be an
/// envelope whose every item has a `sender` in the allowed set and a string
/// `text`; otherwise the whole frame is rejected with
/// [`ChannelError::Protocol`].
pub fn parse_inbound(text: &str) -> Result<Inbound, ChannelError> {
    let trimmed = text.trim();
    match unquote(trimmed) {
        AUTH_ACCEPTED => return Ok(Inbound::AuthAccepted),
        AUTH_REJECTED => return Ok(Inbound::AuthRejected),
        _ => {}
    }

    let envelope: Envelope = serde_json::from_str(trimmed)
        .map_err(|e| ChannelError::protocol(format!("malformed envelope: {e}")))?;
    Ok(Inbound::Envelope(envelope.messages))
}

fn unquote(s: &str) -> &str {
    s.strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(s)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
