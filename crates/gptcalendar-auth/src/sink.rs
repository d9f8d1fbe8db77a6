//! Hooks for persisting newly issued refresh tokens.
//!
//! A login (and occasionally a refresh) hands out a refresh token that is
//! worth keeping in long-lived configuration so the service can restart
//! without a human in the loop. What happens to it is up to the configured
//! [`CredentialSink`].

use std::sync::Mutex;

use tracing::{info, warn};

use crate::credential::{Credential, CredentialSource};
use crate::error::{AuthError, AuthResult};

/// Why a credential is being offered to a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistReason {
    /// A browser login just completed.
    LoginCompleted,
    /// A refresh rotated the refresh token.
    RefreshTokenRotated(CredentialSource),
}

/// Receives credentials whose refresh token should outlive the session.
pub trait CredentialSink: Send + Sync {
    fn persist(&self, credential: &Credential, reason: PersistReason) -> AuthResult<()>;
}

/// Logs the refresh token so an operator can copy it into configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl CredentialSink for LogSink {
    fn persist(&self, credential: &Credential, reason: PersistReason) -> AuthResult<()> {
        match credential.refresh_token.as_deref() {
            Some(refresh_token) => {
                warn!(
                    ?reason,
                    refresh_token,
                    "new refresh token issued; copy it into the refresh_token setting to survive restarts"
                );
            }
            None => info!(?reason, "credential carries no refresh token; nothing to persist"),
        }
        Ok(())
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl CredentialSink for NoopSink {
    fn persist(&self, _credential: &Credential, _reason: PersistReason) -> AuthResult<()> {
        Ok(())
    }
}

/// Keeps every persisted credential in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    persisted: Mutex<Vec<(Credential, PersistReason)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything persisted so far, oldest first.
    pub fn persisted(&self) -> Vec<(Credential, PersistReason)> {
        self.persisted
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl CredentialSink for MemorySink {
    fn persist(&self, credential: &Credential, reason: PersistReason) -> AuthResult<()> {
        self.persisted
            .lock()
            .map_err(|_| AuthError::persistence("memory sink lock poisoned"))?
            .push((credential.clone(), reason));
        Ok(())
    }
}
