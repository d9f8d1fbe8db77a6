//! The OAuth credential model.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{GOOGLE_TOKEN_URI, PersistedGrant};

/// Tokens expiring within this window count as already expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// Longest `expires_in` honoured. Google issues one-hour tokens.
pub const MAX_EXPIRES_IN_SECS: i64 = 7 * 24 * 60 * 60;

/// Where a resolved credential came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    /// A long-lived refresh token from configuration.
    Persisted,
    /// A grant stored in session state after a browser login.
    Interactive,
}

impl CredentialSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Persisted => "persisted",
            Self::Interactive => "interactive",
        }
    }
}

impl std::fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An OAuth2 authorization grant for the Calendar API.
///
/// The serialized form matches what earlier deployments kept in their
/// session cookie (`token`, `refresh_token`, `token_uri`, `client_id`,
/// `client_secret`, `scopes`), with an optional `expiry` on top.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    /// Short-lived bearer token.
    #[serde(alias = "token", default)]
    pub access_token: Option<String>,

    /// Long-lived token used to mint new access tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Token endpoint this grant refreshes against.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,

    /// OAuth client the grant was issued to.
    pub client_id: String,

    /// Secret of that OAuth client, needed for refresh.
    pub client_secret: String,

    /// Scopes granted to this credential.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// When the access token stops being accepted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &self.access_token.as_ref().map(|t| mask(t)))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("token_uri", &self.token_uri)
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish_non_exhaustive()
    }
}

impl Credential {
    /// Builds a credential fresh from a token endpoint response.
    pub fn issued(
        access_token: impl Into<String>,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        token_uri: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            access_token: Some(access_token.into()),
            refresh_token,
            token_uri: token_uri.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            scopes,
            expiry: expires_in_secs.and_then(expiry_in),
        }
    }

    /// Reconstructs a credential from a persisted refresh token.
    ///
    /// The result carries no access token and must be refreshed before use.
    /// Returns `None` unless the grant is complete.
    pub fn from_persisted(
        grant: &PersistedGrant,
        token_uri: impl Into<String>,
        scopes: Vec<String>,
    ) -> Option<Self> {
        let (refresh_token, client_id, client_secret) = grant.parts()?;
        Some(Self {
            access_token: None,
            refresh_token: Some(refresh_token.to_string()),
            token_uri: token_uri.into(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            scopes,
            expiry: None,
        })
    }

    /// Returns true if the access token is past (or within a minute of)
    /// its expiry. Tokens without a known expiry never expire here.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => now + Duration::seconds(EXPIRY_SKEW_SECS) >= expiry,
            None => false,
        }
    }

    /// Returns true if the credential can be handed to an API client as is.
    pub fn is_valid(&self) -> bool {
        self.access_token.as_deref().is_some_and(|t| !t.is_empty()) && !self.is_expired()
    }

    /// Returns true if a refresh exchange can be attempted.
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Returns true if every field a refresh needs is populated.
    pub fn is_complete(&self) -> bool {
        !self.token_uri.is_empty() && !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    /// Applies the result of a refresh exchange.
    ///
    /// Returns true if the endpoint rotated the refresh token.
    pub fn apply_refresh(
        &mut self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        refresh_token: Option<String>,
    ) -> bool {
        self.access_token = Some(access_token.into());
        self.expiry = expires_in_secs.and_then(expiry_in);
        match refresh_token {
            Some(token) if self.refresh_token.as_deref() != Some(token.as_str()) => {
                self.refresh_token = Some(token);
                true
            }
            _ => false,
        }
    }

    /// The access token with everything but its edges hidden, for display.
    pub fn masked_access_token(&self) -> Option<String> {
        self.access_token.as_deref().map(mask)
    }
}

/// Expiry `secs` from now, clamped to [`MAX_EXPIRES_IN_SECS`] either way.
fn expiry_in(secs: i64) -> Option<DateTime<Utc>> {
    let secs = secs.clamp(-MAX_EXPIRES_IN_SECS, MAX_EXPIRES_IN_SECS);
    Duration::try_seconds(secs).and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
}

fn mask(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 12 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", head, tail)
}
