//! Error types for credential resolution and the login handshake.
//!
//! Every operation in this crate returns an [`AuthResult`]. The resolver
//! only ever surfaces [`AuthErrorCode::Unavailable`]; the other codes come
//! from the login handshake and the token endpoint and are logged by the
//! resolver before it falls through to the next source.

use std::fmt;
use thiserror::Error;

/// The category of an authentication error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthErrorCode {
    /// No credential source produced a usable credential.
    Unavailable,
    /// A refresh exchange was attempted and rejected by the token endpoint.
    RefreshFailed,
    /// The callback's anti-forgery state did not match the issued one.
    StateMismatch,
    /// The authorization code could not be exchanged for a credential.
    ExchangeFailed,
    /// The token endpoint could not be reached.
    NetworkError,
    /// The token endpoint answered with something we could not parse.
    InvalidResponse,
    /// Missing or malformed configuration.
    ConfigurationError,
    /// A credential could not be written to persistent storage.
    PersistenceError,
}

impl AuthErrorCode {
    /// Returns the snake_case name of this code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::RefreshFailed => "refresh_failed",
            Self::StateMismatch => "state_mismatch",
            Self::ExchangeFailed => "exchange_failed",
            Self::NetworkError => "network_error",
            Self::InvalidResponse => "invalid_response",
            Self::ConfigurationError => "configuration_error",
            Self::PersistenceError => "persistence_error",
        }
    }

    /// Returns true if the caller should reject an OAuth callback
    /// without storing anything.
    pub fn rejects_callback(&self) -> bool {
        matches!(self, Self::StateMismatch | Self::ExchangeFailed)
    }
}

impl fmt::Display for AuthErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised while obtaining or refreshing a credential.
#[derive(Debug, Error)]
pub struct AuthError {
    code: AuthErrorCode,
    message: String,
    /// OAuth `error` field from the token endpoint (e.g. `invalid_grant`).
    oauth_error: Option<String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AuthError {
    /// Creates a new error with the given code and message.
    pub fn new(code: AuthErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            oauth_error: None,
            source: None,
        }
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::Unavailable, message)
    }

    pub fn refresh_failed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::RefreshFailed, message)
    }

    pub fn state_mismatch(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::StateMismatch, message)
    }

    pub fn exchange_failed(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::ExchangeFailed, message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::NetworkError, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::InvalidResponse, message)
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::ConfigurationError, message)
    }

    pub fn persistence(message: impl Into<String>) -> Self {
        Self::new(AuthErrorCode::PersistenceError, message)
    }

    /// Attaches the OAuth error code reported by the token endpoint.
    pub fn with_oauth_error(mut self, oauth_error: impl Into<String>) -> Self {
        self.oauth_error = Some(oauth_error.into());
        self
    }

    /// Sets the underlying cause.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    pub fn code(&self) -> AuthErrorCode {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the OAuth error code, if the token endpoint sent one.
    pub fn oauth_error(&self) -> Option<&str> {
        self.oauth_error.as_deref()
    }

    /// Returns true if the grant itself was revoked or expired, meaning a
    /// fresh interactive login is the only way forward.
    pub fn is_invalid_grant(&self) -> bool {
        self.oauth_error.as_deref() == Some("invalid_grant")
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)?;
        if let Some(ref oauth_error) = self.oauth_error {
            write!(f, " ({})", oauth_error)?;
        }
        Ok(())
    }
}

/// A specialized Result type for authentication operations.
pub type AuthResult<T> = Result<T, AuthError>;
