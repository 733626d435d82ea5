//! Channel error taxonomy.
//!
//! `Protocol` is the only recoverable variant: the offending frame is dropped
//! and the channel stays open. `AuthRejected`, `Transport` and `Timeout` end
//! the channel. `ChannelNotReady` and `NoActiveChannel` are caller misuse.

use thiserror::Error;

use crate::state::ChannelState;

/// Errors surfaced by session channels and their supervisor.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The open request was malformed (blank token or session id, or the
    /// channel was already opened).
    #[error("invalid open request: {reason}")]
    InvalidRequest {
        /// What was wrong with the request.
        reason: String,
    },

    /// The peer declined the token.
    #[error("authentication rejected by peer")]
    AuthRejected,

    /// An inbound frame could not be understood.
    #[error("protocol error: {reason}")]
    Protocol {
        /// Why the frame was discarded.
        reason: String,
    },

    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// The handshake or teardown did not finish in time.
    #[error("timed out after {timeout_ms}ms: {context}")]
    Timeout {
        /// How long we waited.
        timeout_ms: u64,
        /// What we were waiting for.
        context: String,
    },

    /// `send` was called while the channel was not open.
    #[error("channel not ready (state: {state})")]
    ChannelNotReady {
        /// State at the time of the call.
        state: ChannelState,
    },

    /// `send` was called with no channel in place.
    #[error("no active channel")]
    NoActiveChannel,
}

impl ChannelError {
    /// Shorthand for [`ChannelError::InvalidRequest`].
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`ChannelError::Protocol`].
    pub fn protocol(reason: impl Into<String>) -> Self {
        Self::Protocol {
            reason: reason.into(),
        }
    }

    /// Whether the error ends the channel it came from.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthRejected | Self::Transport(_) | Self::Timeout { .. }
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
