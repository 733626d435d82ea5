//! Plain-text rendering of sessions, messages and channel updates.

use std::fmt::Write as _;

use couch_auth::SessionSummary;
use couch_channel::UpdateKind;
use couch_core::{ChannelError, ChannelState, ChatMessage, Sender};

/// Label for the counterpart's lines.
const COUNTERPART: &str = "Therapist";

/// One transcript line: `<who>: <text>`.
pub fn message_line(message: &ChatMessage, user_name: &str) -> String {
    let who = match message.sender() {
        Sender::User if user_name.is_empty() => "You",
        Sender::User => user_name,
        Sender::Counterpart => COUNTERPART,
    };
    format!("{who}: {}", message.text())
}

/// Status line for a state change, if it is worth showing.
pub fn state_line(state: ChannelState) -> Option<&'static str> {
    match state {
        ChannelState::Connecting => Some("connecting..."),
        ChannelState::AwaitingAuth => Some("authenticating..."),
        ChannelState::Open => Some("connected"),
        ChannelState::Closed => Some("disconnected"),
        ChannelState::Failed => Some("connection lost, type /reconnect to try again"),
        ChannelState::Idle | ChannelState::Closing => None,
    }
}

/// Status line for a channel error.
pub fn error_line(error: &ChannelError) -> String {
    match error {
        ChannelError::AuthRejected => "your login has expired, please sign in again".to_string(),
        ChannelError::ChannelNotReady { state } => {
            format!("not connected yet ({state}), message not sent")
        }
        other => other.to_string(),
    }
}

/// What to print for an update: `(stdout line, is_status)`.
///
/// The user's own messages are already on screen, so they render as
/// nothing.
pub fn update_line(kind: &UpdateKind) -> Option<(String, bool)> {
    match kind {
        UpdateKind::Message(message) if message.sender() == Sender::User => None,
        UpdateKind::Message(message) => Some((message_line(message, ""), false)),
        UpdateKind::State(state) => state_line(*state).map(|s| (s.to_string(), true)),
        UpdateKind::Error(error) => Some((error_line(error), true)),
    }
}

/// Table of sessions, newest first as the backend returns them.
pub fn sessions_table(sessions: &[SessionSummary]) -> String {
    if sessions.is_empty() {
        return "no sessions yet".to_string();
    }
    let mut out = format!("{:<8} {:<20} {:<20}\n", "ID", "STARTED", "ENDED");
    for session in sessions {
        let started = session
            .started_at()
            .map_or_else(|| "-".to_string(), |t| t.format("%Y-%m-%d %H:%M").to_string());
        let ended = match session.ended_at() {
            Some(t) => t.format("%Y-%m-%d %H:%M").to_string(),
            None if session.is_finished() => "?".to_string(),
            None => "ongoing".to_string(),
        };
        let _ = writeln!(out, "{:<8} {started:<20} {ended:<20}", session.id);
    }
    out.truncate(out.trim_end().len());
    out
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(id: &str, start: Option<&str>, end: Option<&str>) -> SessionSummary {
        SessionSummary {
            id: id.into(),
            user_id: Some("7".into()),
            therapist_id: None,
            start_time: start.map(str::to_string),
            end_time: end.map(str::to_string),
        }
    }

    #[test]
    fn message_lines() {
        assert_eq!(message_line(&ChatMessage::user("hi"), "Ada"), "Ada: hi");
        assert_eq!(message_line(&ChatMessage::user("hi"), ""), "You: hi");
        assert_eq!(
            message_line(&ChatMessage::counterpart("hello"), "Ada"),
            "Therapist: hello"
        );
    }

    #[test]
    fn own_messages_not_echoed() {
        assert_eq!(update_line(&UpdateKind::Message(ChatMessage::user("x"))), None);
        assert_eq!(
            update_line(&UpdateKind::Message(ChatMessage::counterpart("y"))),
            Some(("Therapist: y".to_string(), false))
        );
    }

    #[test]
    fn closing_is_silent() {
        assert_eq!(update_line(&UpdateKind::State(ChannelState::Closing)), None);
        assert!(update_line(&UpdateKind::State(ChannelState::Failed)).is_some());
    }

    #[test]
    fn auth_rejection_is_friendly() {
        let (line, status) = update_line(&UpdateKind::Error(ChannelError::AuthRejected)).unwrap();
        assert!(status);
        assert!(line.contains("sign in again"));
    }

    #[test]
    fn sessions_table_rows() {
        let table = sessions_table(&[
            summary("3", Some("2024-05-01T10:00:00"), None),
            summary("2", Some("2024-04-30T09:30:00Z"), Some("2024-04-30T10:00:00Z")),
        ]);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID"));
        assert!(lines[1].starts_with('3'));
        assert!(lines[1].contains("2024-05-01 10:00"));
        assert!(lines[1].contains("ongoing"));
        assert!(lines[2].contains("2024-04-30 10:00"));
    }

    #[test]
    fn empty_sessions_table() {
        assert_eq!(sessions_table(&[]), "no sessions yet");
    }
}
