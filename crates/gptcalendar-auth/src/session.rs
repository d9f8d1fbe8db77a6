//! Per-user session state.
//!
//! The resolver never reads ambient state: callers load a [`Session`] from
//! wherever they keep it (a cookie store, a file), hand it in by `&mut`,
//! and save it back afterwards.

use serde::{Deserialize, Serialize};

use crate::credential::Credential;
use crate::login::PendingLogin;

/// Where the user is in the login handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginState {
    NotAuthenticated,
    /// A state token has been issued and the callback is outstanding.
    PendingCallback,
    Authenticated,
}

/// Session-scoped authentication state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Login started but not completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingLogin>,

    /// Credential from a completed login.
    #[serde(default, alias = "credentials", skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// A session already holding a credential.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            pending: None,
            credential: Some(credential),
        }
    }

    pub fn login_state(&self) -> LoginState {
        if self.credential.is_some() {
            LoginState::Authenticated
        } else if self.pending.is_some() {
            LoginState::PendingCallback
        } else {
            LoginState::NotAuthenticated
        }
    }

    /// Forgets everything, as on logout.
    pub fn clear(&mut self) {
        self.pending = None;
        self.credential = None;
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none() && self.credential.is_none()
    }
}
