//! # couch-auth
//!
//! The HTTP side of a Couch session: log in, create and list session records,
//! and keep the resulting identity in a [`TokenStore`].
//!
//! The real-time channel never reads the store itself; callers take the
//! identity out and hand it to the channel supervisor.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod store;
pub mod types;

pub use client::BackendClient;
pub use errors::AuthError;
pub use store::TokenStore;
pub use types::{LoginResponse, SessionSummary};
