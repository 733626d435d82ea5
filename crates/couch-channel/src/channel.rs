//! Session channel state machine.
//!
//! The channel is synchronous: it reacts to one [`TransportEvent`] or caller
//! request at a time and writes through its [`FrameSink`]. The async driver
//! in [`crate::driver`] feeds it.
//!
//! ```text
//! Idle ──open──▶ Connecting ──Connected / auth frame──▶ AwaitingAuth ──"Valid token"──▶ Open
//!                    │                                      │  "Invalid token"
//!                    │ error / drop                         ▼
//!                    └──────────────▶ Failed ◀────────── Closing
//! Connecting | AwaitingAuth | Open ──close──▶ Closing ──transport closed──▶ Closed
//! ```

use couch_core::{ChannelError, ChannelState, ChatMessage, SessionId, SessionIdentity};
use tracing::{debug, info, trace, warn};

use crate::frame::{Inbound, auth_frame, chat_frame, parse_inbound};
use crate::log::MessageLog;
use crate::transport::{FrameSink, TransportEvent};

/// What a channel needs to start.
#[derive(Clone, Debug)]
pub struct OpenRequest {
    /// Session to connect to.
    pub session_id: SessionId,
    /// Token and user the channel authenticates as.
    pub identity: SessionIdentity,
}

impl OpenRequest {
    /// Bundle a session id and identity.
    pub fn new(session_id: impl Into<SessionId>, identity: SessionIdentity) -> Self {
        Self {
            session_id: session_id.into(),
            identity,
        }
    }

    /// Both the session id and the token must be non-blank.
    pub fn validate(&self) -> Result<(), ChannelError> {
        if self.session_id.is_blank() {
            return Err(ChannelError::invalid_request("empty session id"));
        }
        if !self.identity.has_token() {
            return Err(ChannelError::invalid_request("empty token"));
        }
        Ok(())
    }
}

/// One real-time connection bound to one session.
pub struct SessionChannel {
    state: ChannelState,
    session_id: Option<SessionId>,
    /// Held only until the auth frame is sent.
    token: Option<String>,
    auth_sent: bool,
    /// Where `Closing` settles once the transport confirms teardown.
    settle: ChannelState,
    sink: Box<dyn FrameSink>,
    log: MessageLog,
    transitions: Vec<ChannelState>,
}

impl SessionChannel {
    /// Create an idle channel writing to `sink`.
    pub fn new(sink: Box<dyn FrameSink>) -> Self {
        Self {
            state: ChannelState::Idle,
            session_id: None,
            token: None,
            auth_sent: false,
            settle: ChannelState::Closed,
            sink,
            log: MessageLog::new(),
            transitions: Vec::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Session this channel was opened for.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// The channel's transcript.
    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    /// Snapshot of the transcript.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.log.snapshot()
    }

    /// Whether the authentication frame has gone out.
    pub fn auth_sent(&self) -> bool {
        self.auth_sent
    }

    /// States entered since the last call, oldest first.
    pub fn take_transitions(&mut self) -> Vec<ChannelState> {
        std::mem::take(&mut self.transitions)
    }

    fn enter(&mut self, next: ChannelState) {
        if next == self.state {
            return;
        }
        debug!(from = %self.state, to = %next, "channel state change");
        self.state = next;
        self.transitions.push(next);
    }

    /// `Idle → Connecting`. A blank token or session id, or a channel that
    /// was already opened, is an [`ChannelError::InvalidRequest`] and leaves
    /// the state unchanged.
    pub fn open(&mut self, request: OpenRequest) -> Result<(), ChannelError> {
        if self.state != ChannelState::Idle {
            return Err(ChannelError::invalid_request(format!(
                "channel already {}",
                self.state
            )));
        }
        request.validate()?;

        info!(session_id = %request.session_id, "opening session channel");
        self.session_id = Some(request.session_id);
        self.token = Some(request.identity.token);
        self.enter(ChannelState::Connecting);
        Ok(())
    }

    /// Apply one transport event.
    ///
    /// Returns the error to surface, if any. Protocol errors leave the
    /// channel as it was; every other error leaves it `Failed`.
    pub fn handle_event(&mut self, event: TransportEvent) -> Result<(), ChannelError> {
        match self.state {
            ChannelState::Closing => {
                if matches!(event, TransportEvent::Closed | TransportEvent::Error(_)) {
                    let settle = self.settle;
                    self.enter(settle);
                } else {
                    trace!(?event, "ignoring event while closing");
                }
                Ok(())
            }
            ChannelState::Idle | ChannelState::Closed | ChannelState::Failed => {
                trace!(state = %self.state, ?event, "ignoring event");
                Ok(())
            }
            ChannelState::Connecting | ChannelState::AwaitingAuth | ChannelState::Open => {
                match event {
                    TransportEvent::Connected => self.on_connected(),
                    TransportEvent::Frame(text) => self.on_frame(&text),
                    TransportEvent::Error(reason) => Err(self.fail(ChannelError::Transport(reason))),
                    TransportEvent::Closed => Err(self.fail(ChannelError::Transport(
                        "connection closed unexpectedly".into(),
                    ))),
                }
            }
        }
    }

    fn on_connected(&mut self) -> Result<(), ChannelError> {
        if self.state != ChannelState::Connecting || self.auth_sent {
            debug!(state = %self.state, "duplicate connected event");
            return Ok(());
        }
        let token = self.token.take().unwrap_or_default();
        self.auth_sent = true;
        if let Err(e) = self.sink.submit(auth_frame(&token)) {
            return Err(self.fail(e));
        }
        self.enter(ChannelState::AwaitingAuth);
        Ok(())
    }

    fn on_frame(&mut self, text: &str) -> Result<(), ChannelError> {
        let inbound = parse_inbound(text).inspect_err(|e| {
            warn!(error = %e, len = text.len(), "discarding inbound frame");
        })?;

        match (self.state, inbound) {
            (ChannelState::AwaitingAuth, Inbound::AuthAccepted) => {
                info!("authentication accepted");
                self.enter(ChannelState::Open);
                Ok(())
            }
            (ChannelState::AwaitingAuth, Inbound::AuthRejected) => {
                warn!("authentication rejected");
                self.enter(ChannelState::Closing);
                self.sink.shutdown();
                self.enter(ChannelState::Failed);
                Err(ChannelError::AuthRejected)
            }
            (ChannelState::Open, Inbound::Envelope(messages)) => {
                trace!(count = messages.len(), "appending envelope");
                self.log.extend(messages);
                Ok(())
            }
            (ChannelState::Open, Inbound::AuthAccepted | Inbound::AuthRejected) => {
                Err(ChannelError::protocol("unexpected auth acknowledgement"))
            }
            (ChannelState::AwaitingAuth, Inbound::Envelope(_)) => {
                Err(ChannelError::protocol("chat frame before authentication"))
            }
            (state, _) => Err(ChannelError::protocol(format!("frame while {state}"))),
        }
    }

    /// Optimistically append `text` as a user message, then transmit it.
    ///
    /// Fails with [`ChannelError::ChannelNotReady`], touching neither the
    /// log nor the transport, unless the channel is `Open`.
    pub fn send(&mut self, text: &str) -> Result<(), ChannelError> {
        if self.state != ChannelState::Open {
            return Err(ChannelError::ChannelNotReady { state: self.state });
        }
        self.log.append(ChatMessage::user(text));
        if let Err(e) = self.sink.submit(chat_frame(text)) {
            return Err(self.fail(e));
        }
        Ok(())
    }

    /// Start tearing the channel down. Idempotent.
    ///
    /// Active channels move to `Closing` until the transport confirms;
    /// an idle channel closes at once.
    pub fn close(&mut self) {
        match self.state {
            ChannelState::Connecting | ChannelState::AwaitingAuth | ChannelState::Open => {
                info!(state = %self.state, "closing session channel");
                self.settle = ChannelState::Closed;
                self.token = None;
                self.enter(ChannelState::Closing);
                self.sink.shutdown();
            }
            ChannelState::Idle => self.enter(ChannelState::Closed),
            ChannelState::Closing | ChannelState::Closed | ChannelState::Failed => {}
        }
    }

    /// The handshake deadline passed. Fails the channel if it is still
    /// connecting or awaiting auth.
    pub fn expire_handshake(&mut self, timeout_ms: u64) -> Result<(), ChannelError> {
        if !self.state.is_handshaking() {
            return Ok(());
        }
        let context = if self.state == ChannelState::Connecting {
            "connecting"
        } else {
            "waiting for authentication"
        };
        Err(self.fail(ChannelError::Timeout {
            timeout_ms,
            context: context.into(),
        }))
    }

    /// The close grace period passed without the transport confirming.
    pub fn finish_close(&mut self) {
        if self.state == ChannelState::Closing {
            debug!("transport did not confirm teardown in time");
            let settle = self.settle;
            self.enter(settle);
        }
    }

    fn fail(&mut self, err: ChannelError) -> ChannelError {
        warn!(state = %self.state, error = %err, "session channel failed");
        self.token = None;
        self.sink.shutdown();
        self.enter(ChannelState::Failed);
        err
    }
}

impl std::fmt::Debug for SessionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionChannel")
            .field("state", &self.state)
            .field("session_id", &self.session_id)
            .field("auth_sent", &self.auth_sent)
            .field("messages", &self.log.len())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use couch_core::Sender;

    use super::*;
    use crate::testing::RecordingSink;

    fn identity() -> SessionIdentity {
        SessionIdentity::new("tok-1", "7", "Ada")
    }

    fn channel() -> (SessionChannel, RecordingSink) {
        let sink = RecordingSink::default();
        (SessionChannel::new(Box::new(sink.clone())), sink)
    }

    fn open_channel() -> (SessionChannel, RecordingSink) {
        let (mut ch, sink) = channel();
        ch.open(OpenRequest::new("12", identity())).unwrap();
        ch.handle_event(TransportEvent::Connected).unwrap();
        ch.handle_event(TransportEvent::Frame("Valid token".into())).unwrap();
        assert_eq!(ch.state(), ChannelState::Open);
        (ch, sink)
    }

    fn frame(text: &str) -> TransportEvent {
        TransportEvent::Frame(text.into())
    }

    // ── open ────────────────────────────────────────────────────────

    #[test]
    fn open_moves_to_connecting() {
        let (mut ch, sink) = channel();
        ch.open(OpenRequest::new("12", identity())).unwrap();
        assert_eq!(ch.state(), ChannelState::Connecting);
        assert_eq!(ch.session_id().map(SessionId::as_str), Some("12"));
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn open_rejects_blank_token() {
        let (mut ch, _) = channel();
        let req = OpenRequest::new("12", SessionIdentity::new("", "7", "Ada"));
        assert_matches!(ch.open(req), Err(ChannelError::InvalidRequest { .. }));
        assert_eq!(ch.state(), ChannelState::Idle);
    }

    #[test]
    fn open_rejects_blank_session() {
        let (mut ch, _) = channel();
        assert_matches!(
            ch.open(OpenRequest::new("  ", identity())),
            Err(ChannelError::InvalidRequest { .. })
        );
        assert_eq!(ch.state(), ChannelState::Idle);
    }

    #[test]
    fn open_twice_rejected() {
        let (mut ch, _) = channel();
        ch.open(OpenRequest::new("12", identity())).unwrap();
        assert_matches!(
            ch.open(OpenRequest::new("12", identity())),
            Err(ChannelError::InvalidRequest { .. })
        );
        assert_eq!(ch.state(), ChannelState::Connecting);
    }

    // ── handshake ───────────────────────────────────────────────────

    #[test]
    fn connected_sends_single_auth_frame() {
        let (mut ch, sink) = channel();
        ch.open(OpenRequest::new("12", identity())).unwrap();
        ch.handle_event(TransportEvent::Connected).unwrap();
        assert_eq!(ch.state(), ChannelState::AwaitingAuth);
        assert!(ch.auth_sent());
        assert_eq!(sink.frames(), vec![r#"{"access_token":"tok-1"}"#.to_string()]);

        // A duplicate connectivity report must not resend the token.
        ch.handle_event(TransportEvent::Connected).unwrap();
        assert_eq!(sink.frames().len(), 1);
    }

    #[test]
    fn valid_token_opens_channel() {
        let (ch, sink) = open_channel();
        assert_eq!(ch.state(), ChannelState::Open);
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.shutdown_count(), 0);
    }

    #[test]
    fn invalid_token_fails_and_shuts_transport() {
        let (mut ch, sink) = channel();
        ch.open(OpenRequest::new("12", identity())).unwrap();
        ch.handle_event(TransportEvent::Connected).unwrap();
        let _ = ch.take_transitions();

        let err = ch.handle_event(frame("Invalid token")).unwrap_err();
        assert_eq!(err, ChannelError::AuthRejected);
        assert_eq!(ch.state(), ChannelState::Failed);
        assert!(sink.is_shut_down());
        assert_eq!(
            ch.take_transitions(),
            vec![ChannelState::Closing, ChannelState::Failed]
        );

        // Later frames and sends change nothing.
        ch.handle_event(frame("Valid token")).unwrap();
        assert_eq!(ch.state(), ChannelState::Failed);
        assert_matches!(ch.send("hi"), Err(ChannelError::ChannelNotReady { .. }));
        assert_eq!(sink.frames().len(), 1);
    }

    #[test]
    fn envelope_before_auth_is_protocol_error() {
        let (mut ch, _) = channel();
        ch.open(OpenRequest::new("12", identity())).unwrap();
        ch.handle_event(TransportEvent::Connected).unwrap();
        let result =
            ch.handle_event(frame(r#"{"messages":[{"sender":"therapist","text":"hi"}]}"#));
        assert_matches!(result, Err(ChannelError::Protocol { .. }));
        assert_eq!(ch.state(), ChannelState::AwaitingAuth);
        assert!(ch.log().is_empty());
    }

    #[test]
    fn error_while_connecting_fails_without_auth() {
        let (mut ch, sink) = channel();
        ch.open(OpenRequest::new("12", identity())).unwrap();
        let err = ch
            .handle_event(TransportEvent::Error("connection refused".into()))
            .unwrap_err();
        assert_matches!(err, ChannelError::Transport(ref r) if r == "connection refused");
        assert_eq!(ch.state(), ChannelState::Failed);
        assert!(!ch.auth_sent());
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn unexpected_close_fails_open_channel() {
        let (mut ch, _) = open_channel();
        assert_matches!(
            ch.handle_event(TransportEvent::Closed),
            Err(ChannelError::Transport(_))
        );
        assert_eq!(ch.state(), ChannelState::Failed);
    }

    #[test]
    fn auth_submit_failure_fails_channel() {
        let (mut ch, sink) = channel();
        sink.fail_submits(true);
        ch.open(OpenRequest::new("12", identity())).unwrap();
        assert_matches!(
            ch.handle_event(TransportEvent::Connected),
            Err(ChannelError::Transport(_))
        );
        assert_eq!(ch.state(), ChannelState::Failed);
    }

    // ── open traffic ────────────────────────────────────────────────

    #[test]
    fn envelope_appends_in_order() {
        let (mut ch, _) = open_channel();
        ch.handle_event(frame(r#"{"messages":[{"sender":"therapist","text":"hi"}]}"#))
            .unwrap();
        assert_eq!(ch.messages(), vec![ChatMessage::counterpart("hi")]);

        ch.handle_event(frame(
            r#"{"messages":[{"sender":"user","text":"a"},{"sender":"therapist","text":"b"}]}"#,
        ))
        .unwrap();
        let texts: Vec<_> = ch.messages().iter().map(|m| m.text().to_string()).collect();
        assert_eq!(texts, ["hi", "a", "b"]);
    }

    #[test]
    fn duplicate_envelopes_are_kept() {
        let (mut ch, _) = open_channel();
        let env = r#"{"messages":[{"sender":"therapist","text":"again"}]}"#;
        ch.handle_event(frame(env)).unwrap();
        ch.handle_event(frame(env)).unwrap();
        assert_eq!(ch.log().len(), 2);
    }

    #[test]
    fn malformed_envelope_keeps_channel_open() {
        let (mut ch, _) = open_channel();
        let result = ch.handle_event(frame(
            r#"{"messages":[{"sender":"therapist","text":"ok"},{"text":"no sender"}]}"#,
        ));
        assert_matches!(result, Err(ChannelError::Protocol { .. }));
        assert_eq!(ch.state(), ChannelState::Open);
        assert!(ch.log().is_empty());

        ch.handle_event(frame(r#"{"messages":[{"sender":"therapist","text":"still here"}]}"#))
            .unwrap();
        assert_eq!(ch.log().len(), 1);
    }

    #[test]
    fn repeated_ack_while_open_is_protocol_error() {
        let (mut ch, _) = open_channel();
        assert_matches!(
            ch.handle_event(frame("Valid token")),
            Err(ChannelError::Protocol { .. })
        );
        assert_eq!(ch.state(), ChannelState::Open);
    }

    #[test]
    fn send_appends_then_transmits() {
        let (mut ch, sink) = open_channel();
        ch.send("hello").unwrap();
        assert_eq!(ch.messages(), vec![ChatMessage::user("hello")]);
        assert_eq!(ch.messages()[0].sender(), Sender::User);
        assert_eq!(sink.frames()[1], r#"{"message":"hello"}"#);
    }

    #[test]
    fn send_before_open_has_no_effect() {
        let (mut ch, sink) = channel();
        assert_matches!(
            ch.send("early"),
            Err(ChannelError::ChannelNotReady {
                state: ChannelState::Idle
            })
        );
        ch.open(OpenRequest::new("12", identity())).unwrap();
        ch.handle_event(TransportEvent::Connected).unwrap();
        assert_matches!(
            ch.send("early"),
            Err(ChannelError::ChannelNotReady {
                state: ChannelState::AwaitingAuth
            })
        );
        assert!(ch.log().is_empty());
        assert_eq!(sink.frames().len(), 1);
    }

    #[test]
    fn send_submit_failure_fails_channel_after_append() {
        let (mut ch, sink) = open_channel();
        sink.fail_submits(true);
        assert_matches!(ch.send("lost"), Err(ChannelError::Transport(_)));
        assert_eq!(ch.state(), ChannelState::Failed);
        assert_eq!(ch.log().len(), 1);
    }

    // ── close ───────────────────────────────────────────────────────

    #[test]
    fn close_while_awaiting_auth_ignores_late_ack() {
        let (mut ch, sink) = channel();
        ch.open(OpenRequest::new("12", identity())).unwrap();
        ch.handle_event(TransportEvent::Connected).unwrap();

        ch.close();
        assert_eq!(ch.state(), ChannelState::Closing);
        assert!(sink.is_shut_down());

        ch.handle_event(frame("Valid token")).unwrap();
        assert_eq!(ch.state(), ChannelState::Closing);

        ch.handle_event(TransportEvent::Closed).unwrap();
        assert_eq!(ch.state(), ChannelState::Closed);

        ch.handle_event(frame("Valid token")).unwrap();
        assert_eq!(ch.state(), ChannelState::Closed);
    }

    #[test]
    fn close_is_idempotent() {
        let (mut ch, sink) = open_channel();
        ch.close();
        ch.close();
        assert_eq!(sink.shutdown_count(), 1);
        ch.handle_event(TransportEvent::Error("reset".into())).unwrap();
        assert_eq!(ch.state(), ChannelState::Closed);
        ch.close();
        assert_eq!(ch.state(), ChannelState::Closed);
    }

    #[test]
    fn frames_after_close_are_not_logged() {
        let (mut ch, _) = open_channel();
        ch.close();
        ch.handle_event(frame(r#"{"messages":[{"sender":"therapist","text":"late"}]}"#))
            .unwrap();
        assert!(ch.log().is_empty());
    }

    #[test]
    fn close_idle_channel() {
        let (mut ch, sink) = channel();
        ch.close();
        assert_eq!(ch.state(), ChannelState::Closed);
        assert_eq!(sink.shutdown_count(), 0);
    }

    #[test]
    fn finish_close_settles() {
        let (mut ch, _) = open_channel();
        ch.close();
        ch.finish_close();
        assert_eq!(ch.state(), ChannelState::Closed);
    }

    // ── timeouts ────────────────────────────────────────────────────

    #[test]
    fn handshake_expiry_fails_channel() {
        let (mut ch, sink) = channel();
        ch.open(OpenRequest::new("12", identity())).unwrap();
        ch.handle_event(TransportEvent::Connected).unwrap();
        let err = ch.expire_handshake(1000).unwrap_err();
        assert_matches!(err, ChannelError::Timeout { timeout_ms: 1000, .. });
        assert_eq!(ch.state(), ChannelState::Failed);
        assert!(sink.is_shut_down());
    }

    #[test]
    fn handshake_expiry_ignored_once_open() {
        let (mut ch, _) = open_channel();
        ch.expire_handshake(1000).unwrap();
        assert_eq!(ch.state(), ChannelState::Open);
    }

    #[test]
    fn transitions_are_recorded() {
        let (mut ch, _) = channel();
        ch.open(OpenRequest::new("12", identity())).unwrap();
        ch.handle_event(TransportEvent::Connected).unwrap();
        ch.handle_event(frame("Valid token")).unwrap();
        assert_eq!(
            ch.take_transitions(),
            vec![
                ChannelState::Connecting,
                ChannelState::AwaitingAuth,
                ChannelState::Open
            ]
        );
        assert!(ch.take_transitions().is_empty());
    }
}
