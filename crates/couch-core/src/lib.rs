//! # couch-core
//!
//! Shared vocabulary for the Couch session client.
//!
//! - **Identity**: [`SessionIdentity`] (bearer token + user) and the [`SessionId`] newtype
//! - **Messages**: [`ChatMessage`] with its [`Sender`]
//! - **Channel state**: the [`ChannelState`] lifecycle enum
//! - **Errors**: [`ChannelError`] taxonomy via `thiserror`
//! - **Logging**: [`logging::init_subscriber`] for the `tracing` subscriber

#![deny(unsafe_code)]

pub mod errors;
pub mod identity;
pub mod logging;
pub mod messages;
pub mod state;

pub use errors::ChannelError;
pub use identity::{SessionId, SessionIdentity};
pub use messages::{ChatMessage, Sender};
pub use state::ChannelState;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
