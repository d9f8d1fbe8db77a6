//! OAuth client configuration.

use std::time::Duration;

use url::Url;

use crate::error::{AuthError, AuthResult};

/// Google's OAuth authorization endpoint.
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google's OAuth token endpoint.
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Write access to calendar events.
pub const CALENDAR_EVENTS_SCOPE: &str = "https://www.googleapis.com/auth/calendar.events";

/// OAuth client identifier and secret from Google Cloud Console.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

impl OAuthCredentials {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Checks that the credentials look like a Google OAuth client.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if !self.client_id.ends_with(".apps.googleusercontent.com") {
            return Err("client_id should end with .apps.googleusercontent.com");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Everything the resolver needs to talk to Google's OAuth endpoints.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// OAuth client used for the interactive login flow.
    pub credentials: OAuthCredentials,

    /// Authorization endpoint the browser is redirected to.
    pub auth_uri: String,

    /// Token endpoint for code exchange and refresh.
    pub token_uri: String,

    /// Fixed callback URL registered with the OAuth client.
    pub redirect_uri: String,

    /// Scopes requested during login.
    pub scopes: Vec<String>,

    /// HTTP request timeout for the token endpoint.
    pub timeout: Duration,

    /// User agent sent to the token endpoint.
    pub user_agent: String,
}

impl AuthConfig {
    pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

    pub const DEFAULT_REDIRECT_URI: &'static str = "http://127.0.0.1:8080/oauth2callback";

    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            redirect_uri: Self::DEFAULT_REDIRECT_URI.to_string(),
            scopes: vec![CALENDAR_EVENTS_SCOPE.to_string()],
            timeout: Duration::from_secs(Self::DEFAULT_TIMEOUT_SECS),
            user_agent: format!("gptcalendar/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    pub fn with_auth_uri(mut self, uri: impl Into<String>) -> Self {
        self.auth_uri = uri.into();
        self
    }

    pub fn with_token_uri(mut self, uri: impl Into<String>) -> Self {
        self.token_uri = uri.into();
        self
    }

    pub fn with_redirect_uri(mut self, uri: impl Into<String>) -> Self {
        self.redirect_uri = uri.into();
        self
    }

    pub fn with_scopes(mut self, scopes: Vec<String>) -> Self {
        self.scopes = scopes;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Validates the configuration.
    pub fn validate(&self) -> AuthResult<()> {
        self.credentials
            .validate()
            .map_err(|e| AuthError::configuration(format!("invalid credentials: {}", e)))?;

        if self.scopes.is_empty() {
            return Err(AuthError::configuration(
                "at least one OAuth scope is required",
            ));
        }

        for (name, value) in [
            ("auth_uri", &self.auth_uri),
            ("token_uri", &self.token_uri),
            ("redirect_uri", &self.redirect_uri),
        ] {
            let parsed = Url::parse(value)
                .map_err(|e| AuthError::configuration(format!("invalid {}: {}", name, e)))?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AuthError::configuration(format!(
                    "{} must be an http(s) URL",
                    name
                )));
            }
        }

        Ok(())
    }
}

/// A long-lived grant supplied out-of-band through configuration.
///
/// All three fields must be present for the persisted source to be tried.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct PersistedGrant {
    pub refresh_token: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl std::fmt::Debug for PersistedGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistedGrant")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl PersistedGrant {
    /// A grant with nothing configured; the persisted source is skipped.
    pub fn none() -> Self {
        Self::default()
    }

    /// Builds a grant that reuses the login client's identifier and secret.
    pub fn for_client(credentials: &OAuthCredentials, refresh_token: Option<String>) -> Self {
        Self {
            refresh_token,
            client_id: Some(credentials.client_id.clone()),
            client_secret: Some(credentials.client_secret.clone()),
        }
    }

    /// Returns `(refresh_token, client_id, client_secret)` when every part
    /// is present and non-empty.
    pub fn parts(&self) -> Option<(&str, &str, &str)> {
        fn non_empty(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|s| !s.trim().is_empty())
        }
        Some((
            non_empty(&self.refresh_token)?,
            non_empty(&self.client_id)?,
            non_empty(&self.client_secret)?,
        ))
    }

    pub fn is_complete(&self) -> bool {
        self.parts().is_some()
    }
}
