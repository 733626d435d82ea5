//! In-memory transport doubles for tests.
//!
//! [`RecordingSink`] records outbound frames. [`ScriptedConnector`] hands out
//! links whose events are pushed by the test instead of a socket.

use std::sync::Arc;

use couch_core::ChannelError;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use url::Url;

use crate::transport::{Connector, FrameSink, TransportEvent, TransportLink};

#[derive(Debug, Default)]
struct SinkState {
    frames: Vec<String>,
    shutdowns: usize,
    fail_submits: bool,
}

/// Sink that records every frame and shutdown request.
#[derive(Clone, Debug, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    /// Frames submitted so far.
    pub fn frames(&self) -> Vec<String> {
        self.state.lock().frames.clone()
    }

    /// How many times `shutdown` was called.
    pub fn shutdown_count(&self) -> usize {
        self.state.lock().shutdowns
    }

    /// Whether `shutdown` was called at least once.
    pub fn is_shut_down(&self) -> bool {
        self.shutdown_count() > 0
    }

    /// Make subsequent submits fail with a transport error.
    pub fn fail_submits(&self, fail: bool) {
        self.state.lock().fail_submits = fail;
    }
}

impl FrameSink for RecordingSink {
    fn submit(&self, frame: String) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        if state.fail_submits {
            return Err(ChannelError::Transport("connection closed".into()));
        }
        state.frames.push(frame);
        Ok(())
    }

    fn shutdown(&self) {
        self.state.lock().shutdowns += 1;
    }
}

/// The test's end of one scripted connection.
#[derive(Clone, Debug)]
pub struct ScriptedLink {
    /// Address the connector was asked for.
    pub url: Url,
    /// Frames the channel wrote.
    pub sink: RecordingSink,
    /// Push events to the channel.
    pub events: mpsc::Sender<TransportEvent>,
}

impl ScriptedLink {
    /// Deliver `event`; ignored if the channel is gone.
    pub async fn push(&self, event: TransportEvent) {
        let _ = self.events.send(event).await;
    }

    /// Deliver a text frame.
    pub async fn frame(&self, text: &str) {
        self.push(TransportEvent::Frame(text.to_string())).await;
    }
}

/// Connector whose links are driven by the test.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConnector {
    links: Arc<Mutex<Vec<ScriptedLink>>>,
}

impl ScriptedConnector {
    /// Every link handed out, oldest first.
    pub fn links(&self) -> Vec<ScriptedLink> {
        self.links.lock().clone()
    }

    /// The most recent link.
    pub fn last(&self) -> Option<ScriptedLink> {
        self.links.lock().last().cloned()
    }

    /// Number of connections attempted.
    pub fn connect_count(&self) -> usize {
        self.links.lock().len()
    }
}

impl Connector for ScriptedConnector {
    fn connect(&self, url: &Url) -> TransportLink {
        let (tx, rx) = mpsc::channel(64);
        let sink = RecordingSink::default();
        self.links.lock().push(ScriptedLink {
            url: url.clone(),
            sink: sink.clone(),
            events: tx,
        });
        TransportLink {
            sink: Box::new(sink),
            events: rx,
        }
    }
}
