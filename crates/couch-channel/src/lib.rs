//! # couch-channel
//!
//! Real-time session channels for Couch.
//!
//! - **State machine**: [`SessionChannel`] drives one connection through
//!   connect, token handshake, chat traffic and teardown
//! - **Wire frames**: [`frame`] encodes outbound JSON and decodes auth
//!   acknowledgements and message envelopes
//! - **Message log**: [`MessageLog`], the append-only transcript per channel
//! - **Transport**: the [`Connector`] / [`FrameSink`] seam, with
//!   [`WsConnector`] over `tokio-tungstenite`
//! - **Driver**: [`ChannelHandle`] runs a channel on its own task and
//!   publishes [`ChannelUpdate`]s
//! - **Supervisor**: [`ChannelSupervisor`] keeps at most one live channel

#![deny(unsafe_code)]

pub mod channel;
pub mod driver;
pub mod frame;
pub mod log;
pub mod supervisor;
pub mod testing;
pub mod transport;
pub mod ws;

pub use channel::{OpenRequest, SessionChannel};
pub use driver::{ChannelConfig, ChannelHandle, ChannelUpdate, UpdateKind};
pub use log::MessageLog;
pub use supervisor::ChannelSupervisor;
pub use transport::{Connector, FrameSink, TransportEvent, TransportLink, session_url};
pub use ws::WsConnector;
