//! Channel supervisor.
//!
//! Keeps at most one live channel. Opening a different session closes the
//! previous channel first; opening the session that is already live is a
//! no-op. All channel updates flow through one broadcast, tagged with the
//! channel id so late updates from a replaced channel can be filtered.

use std::sync::Arc;

use couch_core::{ChannelError, ChannelState, ChatMessage, SessionId, SessionIdentity};
use tokio::sync::broadcast;
use tracing::{debug, info, instrument};
use url::Url;

use crate::channel::OpenRequest;
use crate::driver::{ChannelConfig, ChannelHandle, ChannelUpdate};
use crate::transport::{Connector, session_url};

/// Owns the single live session channel.
pub struct ChannelSupervisor {
    connector: Arc<dyn Connector>,
    ws_base: Url,
    config: ChannelConfig,
    updates: broadcast::Sender<ChannelUpdate>,
    current: Option<ChannelHandle>,
    next_channel_id: u64,
}

impl ChannelSupervisor {
    /// Create a supervisor that connects to `<ws_base>/ws/session/<id>`.
    pub fn new(connector: Arc<dyn Connector>, ws_base: Url, config: ChannelConfig) -> Self {
        let (updates, _) = broadcast::channel(config.update_buffer.max(1));
        Self {
            connector,
            ws_base,
            config,
            updates,
            current: None,
            next_channel_id: 1,
        }
    }

    /// Receive updates from every channel this supervisor opens.
    pub fn subscribe(&self) -> broadcast::Receiver<ChannelUpdate> {
        self.updates.subscribe()
    }

    /// Open a channel for `session_id`, replacing any other live channel.
    ///
    /// Returns the id of the live channel. If that session already has a
    /// channel that has not ended, no new connection is made.
    #[instrument(skip_all, fields(session_id = %session_id))]
    pub fn open(
        &mut self,
        session_id: SessionId,
        identity: &SessionIdentity,
    ) -> Result<u64, ChannelError> {
        let request = OpenRequest::new(session_id, identity.clone());
        request.validate()?;

        if let Some(current) = &self.current {
            if current.session_id() == &request.session_id && current.state().is_active() {
                debug!(channel_id = current.channel_id(), "session already connected");
                return Ok(current.channel_id());
            }
        }

        let url = session_url(&self.ws_base, &request.session_id)?;
        self.close();

        let channel_id = self.next_channel_id;
        self.next_channel_id += 1;

        info!(channel_id, url = %url, "opening channel");
        let link = self.connector.connect(&url);
        let handle = ChannelHandle::spawn(
            channel_id,
            request,
            link,
            self.config.clone(),
            self.updates.clone(),
        )?;
        self.current = Some(handle);
        Ok(channel_id)
    }

    /// Send on the live channel.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        match &self.current {
            Some(handle) => handle.send(text).await,
            None => Err(ChannelError::NoActiveChannel),
        }
    }

    /// Close the live channel, if any. Idempotent.
    pub fn close(&mut self) {
        if let Some(handle) = self.current.take() {
            debug!(channel_id = handle.channel_id(), "closing channel");
            handle.close();
        }
    }

    /// The live channel, if any.
    pub fn current(&self) -> Option<&ChannelHandle> {
        self.current.as_ref()
    }

    /// State of the live channel; `Idle` when there is none.
    pub fn state(&self) -> ChannelState {
        self.current
            .as_ref()
            .map_or(ChannelState::Idle, ChannelHandle::state)
    }

    /// Session of the live channel.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.current.as_ref().map(ChannelHandle::session_id)
    }

    /// Transcript of the live channel; empty when there is none.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.current
            .as_ref()
            .map(ChannelHandle::messages)
            .unwrap_or_default()
    }
}

impl Drop for ChannelSupervisor {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ChannelSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSupervisor")
            .field("ws_base", &self.ws_base.as_str())
            .field("current", &self.current)
            .field("next_channel_id", &self.next_channel_id)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
