//! Transport seam between the channel state machine and the network.
//!
//! A [`Connector`] starts a connection attempt and immediately returns a
//! [`TransportLink`]: a [`FrameSink`] for outbound frames and a receiver of
//! [`TransportEvent`]s. Connectivity is reported later as
//! [`TransportEvent::Connected`].

use couch_core::{ChannelError, SessionId};
use tokio::sync::mpsc;
use url::Url;

/// Something that happened on the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection is established.
    Connected,
    /// A text payload arrived.
    Frame(String),
    /// The connection failed.
    Error(String),
    /// The connection ended (either side).
    Closed,
}

/// Outbound half of a transport. Only the owning channel writes to it.
pub trait FrameSink: Send + Sync {
    /// Queue a text frame for transmission. Does not wait for delivery.
    fn submit(&self, frame: String) -> Result<(), ChannelError>;

    /// Begin tearing the connection down. Completion is reported as
    /// [`TransportEvent::Closed`]. Calling it more than once is harmless.
    fn shutdown(&self);
}

/// A connection attempt in progress.
pub struct TransportLink {
    /// Outbound frames.
    pub sink: Box<dyn FrameSink>,
    /// Inbound events, in arrival order.
    pub events: mpsc::Receiver<TransportEvent>,
}

/// Starts connections to session endpoints.
pub trait Connector: Send + Sync {
    /// Begin connecting to `url`. Must not block; must be called from within
    /// a Tokio runtime.
    fn connect(&self, url: &Url) -> TransportLink;
}

/// Address of a session's real-time endpoint: `<base>/ws/session/<id>`.
pub fn session_url(base: &Url, session_id: &SessionId) -> Result<Url, ChannelError> {
    if session_id.is_blank() {
        return Err(ChannelError::invalid_request("empty session id"));
    }
    let mut url = base.clone();
    {
        let mut segments = url.path_segments_mut().map_err(|()| {
            ChannelError::invalid_request(format!("{base} cannot take a path"))
        })?;
        let _ = segments
            .pop_if_empty()
            .extend(["ws", "session", session_id.as_str()]);
    }
    Ok(url)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
