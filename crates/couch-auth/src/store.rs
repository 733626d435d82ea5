//! In-memory token store.
//!
//! Holds the identity produced by login for as long as the user stays logged
//! in. Cloning the store shares the same slot; readers get their own copy of
//! the identity, which is then passed explicitly to whatever opens a channel.

use std::sync::Arc;

use couch_core::SessionIdentity;
use parking_lot::RwLock;

use crate::client::BackendClient;
use crate::errors::AuthError;

/// Shared slot for the current [`SessionIdentity`].
#[derive(Clone, Debug, Default)]
pub struct TokenStore {
    inner: Arc<RwLock<Option<SessionIdentity>>>,
}

impl TokenStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Log in through `client` and keep the resulting identity.
    ///
    /// A failed login leaves any previously stored identity untouched.
    pub async fn login(
        &self,
        client: &BackendClient,
        username: &str,
        password: &str,
    ) -> Result<SessionIdentity, AuthError> {
        let identity = client.login(username, password).await?;
        self.set(identity.clone());
        Ok(identity)
    }

    /// Replace the stored identity.
    pub fn set(&self, identity: SessionIdentity) {
        *self.inner.write() = Some(identity);
    }

    /// Current identity, if logged in.
    pub fn current(&self) -> Option<SessionIdentity> {
        self.inner.read().clone()
    }

    /// Current identity or [`AuthError::NotLoggedIn`].
    pub fn require(&self) -> Result<SessionIdentity, AuthError> {
        self.current().ok_or(AuthError::NotLoggedIn)
    }

    /// Whether an identity with a usable token is stored.
    pub fn is_logged_in(&self) -> bool {
        self.inner
            .read()
            .as_ref()
            .is_some_and(SessionIdentity::has_token)
    }

    /// Forget the stored identity. Returns the identity that was removed.
    pub fn logout(&self) -> Option<SessionIdentity> {
        let previous = self.inner.write().take();
        if previous.is_some() {
            tracing::info!("logged out");
        }
        previous
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
