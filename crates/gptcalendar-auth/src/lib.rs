//! Google OAuth2 credential resolution for the calendar service.
//!
//! This crate decides which credential an incoming request should use:
//!
//! - [`CredentialResolver`] - Tries each credential source in order and refreshes as needed
//! - [`Session`] - Per-user state carried between requests (pending login, stored credential)
//! - [`TokenEndpoint`] - The token endpoint seam, with [`HttpTokenEndpoint`] for production
//! - [`CredentialSink`] - Where newly issued refresh tokens go
//! - [`AuthError`] - Error types for every operation
//!
//! # Resolution order
//!
//! ```text
//! ┌──────────────────┐   refresh ok    ┌────────────────────┐
//! │ PersistedGrant   │ ──────────────▶ │                    │
//! └────────┬─────────┘                 │                    │
//!          │ missing / rejected        │ ResolvedCredential │
//!          ▼                           │                    │
//! ┌──────────────────┐  valid / ok     │                    │
//! │ Session          │ ──────────────▶ │                    │
//! └────────┬─────────┘                 └────────────────────┘
//!          │ nothing usable
//!          ▼
//!    Unavailable
//! ```
//!
//! # Example
//!
//! ```ignore
//! use gptcalendar_auth::{AuthConfig, CredentialResolver, OAuthCredentials, PersistedGrant, Session};
//!
//! let resolver = CredentialResolver::new(AuthConfig::new(OAuthCredentials::new(id, secret)))?;
//! let mut session = Session::new();
//! match resolver.resolve(&PersistedGrant::none(), &mut session).await {
//!     Ok(resolved) => call_calendar_api(resolved.access_token()).await,
//!     Err(_) => redirect_to(resolver.begin_login_into(&mut session)?),
//! }
//! ```

pub mod config;
pub mod credential;
pub mod endpoint;
pub mod error;
pub mod login;
pub mod resolver;
pub mod session;
pub mod sink;

// Re-export main types at crate root
pub use config::{
    AuthConfig, CALENDAR_EVENTS_SCOPE, GOOGLE_AUTH_URI, GOOGLE_TOKEN_URI, OAuthCredentials,
    PersistedGrant,
};
pub use credential::{Credential, CredentialSource};
pub use endpoint::{BoxFuture, CodeExchange, HttpTokenEndpoint, TokenEndpoint, TokenGrant};
pub use error::{AuthError, AuthErrorCode, AuthResult};
pub use login::{CallbackParams, LoginRedirect, PendingLogin};
pub use resolver::{CredentialResolver, ResolvedCredential};
pub use session::{LoginState, Session};
pub use sink::{CredentialSink, LogSink, MemorySink, NoopSink, PersistReason};
