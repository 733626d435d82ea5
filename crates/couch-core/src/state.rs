//! Channel lifecycle states.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a session channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelState {
    /// Created, no open request yet.
    #[default]
    Idle,
    /// Transport connection in progress.
    Connecting,
    /// Connected; auth frame sent, waiting for the verdict.
    AwaitingAuth,
    /// Authenticated; chat frames flow both ways.
    Open,
    /// Teardown requested; inbound frames are ignored.
    Closing,
    /// Torn down on request.
    Closed,
    /// Ended by auth rejection, transport failure or timeout.
    Failed,
}

impl ChannelState {
    /// States in which a live connection attempt or session exists.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::AwaitingAuth | Self::Open)
    }

    /// States the channel never leaves.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Failed)
    }

    /// Whether the handshake is still pending.
    #[must_use]
    pub const fn is_handshaking(self) -> bool {
        matches!(self, Self::Connecting | Self::AwaitingAuth)
    }

    /// Short lowercase label, used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::AwaitingAuth => "awaiting_auth",
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
