//! Async driver for one [`SessionChannel`].
//!
//! Each opened channel gets its own task. The task is the only owner of the
//! state machine: transport events, caller commands and deadlines are
//! applied one at a time, and whatever changed is published as
//! [`ChannelUpdate`]s tagged with the channel's id.

use std::time::Duration;

use couch_core::{ChannelError, ChannelState, ChatMessage, SessionId};
use couch_settings::ChannelSettings;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{Instrument, debug, info_span, warn};

use crate::channel::{OpenRequest, SessionChannel};
use crate::log::MessageLog;
use crate::transport::{TransportEvent, TransportLink};

/// Timing and buffering for channel tasks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// How long `Connecting` plus `AwaitingAuth` may take. `None` waits forever.
    pub handshake_timeout: Option<Duration>,
    /// How long `Closing` waits for the transport before settling anyway.
    pub close_grace: Duration,
    /// Capacity of the update broadcast.
    pub update_buffer: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self::from(&ChannelSettings::default())
    }
}

impl From<&ChannelSettings> for ChannelConfig {
    fn from(settings: &ChannelSettings) -> Self {
        Self {
            handshake_timeout: (settings.handshake_timeout_ms > 0)
                .then(|| Duration::from_millis(settings.handshake_timeout_ms)),
            close_grace: Duration::from_millis(settings.close_grace_ms),
            update_buffer: settings.update_buffer.max(1),
        }
    }
}

/// Something observable happened on a channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelUpdate {
    /// Which channel. Ids increase with every open, so updates from a
    /// replaced channel can be told apart.
    pub channel_id: u64,
    /// Session the channel is bound to.
    pub session_id: SessionId,
    /// What happened.
    pub kind: UpdateKind,
}

/// Payload of a [`ChannelUpdate`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpdateKind {
    /// The channel entered a new state.
    State(ChannelState),
    /// A message was appended to the log.
    Message(ChatMessage),
    /// An error was raised on the channel.
    Error(ChannelError),
}

enum Command {
    Send {
        text: String,
        reply: oneshot::Sender<Result<(), ChannelError>>,
    },
    Close,
}

/// Caller's handle to a running channel task.
///
/// Dropping the handle closes the channel.
#[derive(Debug)]
pub struct ChannelHandle {
    channel_id: u64,
    session_id: SessionId,
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<ChannelState>,
    log: MessageLog,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    /// Open a channel for `request` over `link` and start its task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(
        channel_id: u64,
        request: OpenRequest,
        link: TransportLink,
        config: ChannelConfig,
        updates: broadcast::Sender<ChannelUpdate>,
    ) -> Result<Self, ChannelError> {
        let TransportLink { sink, events } = link;
        let session_id = request.session_id.clone();

        let mut channel = SessionChannel::new(sink);
        channel.open(request)?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(channel.state());
        let log = channel.log().clone();

        let span = info_span!("session_channel", channel_id, session_id = %session_id);
        let driver = Driver {
            channel_id,
            session_id: session_id.clone(),
            channel,
            events,
            commands: cmd_rx,
            state_tx,
            updates,
            config,
            published: 0,
        };
        let task = tokio::spawn(driver.run().instrument(span));

        Ok(Self {
            channel_id,
            session_id,
            commands: cmd_tx,
            state: state_rx,
            log,
            task,
        })
    }

    /// Id assigned when the channel was opened.
    pub fn channel_id(&self) -> u64 {
        self.channel_id
    }

    /// Session the channel is bound to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Latest published state.
    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// A receiver that tracks the channel's state.
    pub fn state_watch(&self) -> watch::Receiver<ChannelState> {
        self.state.clone()
    }

    /// Shared view of the channel's log.
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Snapshot of the channel's log.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.log.snapshot()
    }

    /// Send a chat message. Resolves once the frame is queued on the
    /// transport, or with the reason it was not.
    pub async fn send(&self, text: impl Into<String>) -> Result<(), ChannelError> {
        let (reply, rx) = oneshot::channel();
        let command = Command::Send {
            text: text.into(),
            reply,
        };
        if self.commands.send(command).is_err() {
            return Err(self.not_ready());
        }
        rx.await.unwrap_or_else(|_| Err(self.not_ready()))
    }

    /// Ask the channel to close. Idempotent.
    pub fn close(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Wait until the channel reaches `Closed` or `Failed`.
    pub async fn terminated(&self) -> ChannelState {
        let mut rx = self.state.clone();
        let reached = match rx.wait_for(|state| state.is_terminal()).await {
            Ok(state) => Some(*state),
            Err(_) => None,
        };
        reached.unwrap_or_else(|| *rx.borrow())
    }

    /// Whether the channel task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    fn not_ready(&self) -> ChannelError {
        ChannelError::ChannelNotReady {
            state: self.state(),
        }
    }
}

struct Driver {
    channel_id: u64,
    session_id: SessionId,
    channel: SessionChannel,
    events: mpsc::Receiver<TransportEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    state_tx: watch::Sender<ChannelState>,
    updates: broadcast::Sender<ChannelUpdate>,
    config: ChannelConfig,
    /// Log entries already broadcast.
    published: usize,
}

impl Driver {
    async fn run(mut self) {
        let handshake_deadline = self.config.handshake_timeout.map(|t| Instant::now() + t);
        let mut closing_deadline: Option<Instant> = None;
        let mut commands_open = true;

        self.flush(None);

        loop {
            if self.channel.state() == ChannelState::Closing && closing_deadline.is_none() {
                closing_deadline = Some(Instant::now() + self.config.close_grace);
            }
            let deadline = match self.channel.state() {
                state if state.is_handshaking() => handshake_deadline,
                ChannelState::Closing => closing_deadline,
                _ => None,
            };

            // biased: a queued close must win over frames that arrived after it
            let error = tokio::select! {
                biased;
                command = self.commands.recv(), if commands_open => match command {
                    Some(Command::Send { text, reply }) => {
                        let result = self.channel.send(&text);
                        let error = result.as_ref().err().filter(|e| e.is_fatal()).cloned();
                        let _ = reply.send(result);
                        error
                    }
                    Some(Command::Close) => {
                        self.channel.close();
                        None
                    }
                    None => {
                        debug!("handle dropped, closing channel");
                        commands_open = false;
                        self.channel.close();
                        None
                    }
                },
                event = self.events.recv() => {
                    let event = event.unwrap_or(TransportEvent::Closed);
                    self.channel.handle_event(event).err()
                }
                () = wait_until(deadline) => {
                    if self.channel.state() == ChannelState::Closing {
                        self.channel.finish_close();
                        None
                    } else {
                        let timeout_ms = self
                            .config
                            .handshake_timeout
                            .map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
                        self.channel.expire_handshake(timeout_ms).err()
                    }
                }
            };

            self.flush(error);

            if self.channel.state().is_terminal() {
                debug!(state = %self.channel.state(), "channel task exiting");
                break;
            }
        }
    }

    /// Publish new log entries, then state changes, then `error`.
    fn flush(&mut self, error: Option<ChannelError>) {
        let log = self.channel.log();
        if log.len() > self.published {
            let fresh = log.since(self.published);
            self.published += fresh.len();
            for message in fresh {
                self.publish(UpdateKind::Message(message));
            }
        }

        for state in self.channel.take_transitions() {
            let _ = self.state_tx.send_replace(state);
            self.publish(UpdateKind::State(state));
        }

        if let Some(error) = error {
            if !error.is_fatal() {
                warn!(error = %error, "channel error");
            }
            self.publish(UpdateKind::Error(error));
        }
    }

    fn publish(&self, kind: UpdateKind) {
        let _ = self.updates.send(ChannelUpdate {
            channel_id: self.channel_id,
            session_id: self.session_id.clone(),
            kind,
        });
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
