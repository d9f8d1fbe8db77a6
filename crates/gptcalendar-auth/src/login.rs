//! Authorization-code login handshake.
//!
//! Logging in takes two requests. [`PendingLogin::start`] produces the
//! browser redirect plus the state the caller keeps until the callback
//! arrives. [`CallbackParams::parse`] pulls the code and echoed state back
//! out of the callback URL.
//!
//! Besides the anti-forgery `state`, every login carries a PKCE (RFC 7636)
//! verifier whose S256 challenge goes into the authorization URL.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};

/// Random bytes behind a PKCE verifier (43 chars once encoded).
const CODE_VERIFIER_LENGTH: usize = 32;

/// Random bytes behind the anti-forgery state.
const STATE_LENGTH: usize = 16;

/// A login that has been started but not yet completed.
///
/// The caller must keep this across the redirect round trip, typically in
/// the user's session.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingLogin {
    /// Anti-forgery token echoed back by the authorization server.
    pub state: String,
    /// PKCE code verifier.
    pub code_verifier: String,
    /// Callback URL the code will be delivered to.
    pub redirect_uri: String,
    /// Scopes requested in this login.
    pub scopes: Vec<String>,
    pub issued_at: DateTime<Utc>,
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .field("issued_at", &self.issued_at)
            .finish_non_exhaustive()
    }
}

/// The redirect target for a new login plus the state to keep.
#[derive(Debug, Clone)]
pub struct LoginRedirect {
    pub authorization_url: String,
    pub pending: PendingLogin,
}

impl PendingLogin {
    /// Starts a login against the configured authorization endpoint.
    ///
    /// Requests offline access with forced consent so Google always issues
    /// a refresh token.
    pub fn start(config: &AuthConfig) -> AuthResult<LoginRedirect> {
        let pending = Self {
            state: random_token(STATE_LENGTH),
            code_verifier: random_token(CODE_VERIFIER_LENGTH),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.clone(),
            issued_at: Utc::now(),
        };
        let authorization_url = pending.authorization_url(config)?;
        Ok(LoginRedirect {
            authorization_url,
            pending,
        })
    }

    /// The S256 challenge for this login's verifier.
    pub fn code_challenge(&self) -> String {
        compute_challenge(&self.code_verifier)
    }

    fn authorization_url(&self, config: &AuthConfig) -> AuthResult<String> {
        let mut url = Url::parse(&config.auth_uri)
            .map_err(|e| AuthError::configuration(format!("invalid auth_uri: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &config.credentials.client_id)
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scopes.join(" "))
            .append_pair("state", &self.state)
            .append_pair("code_challenge", &self.code_challenge())
            .append_pair("code_challenge_method", "S256")
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent");
        Ok(url.into())
    }
}

/// What the authorization server sent back to the callback URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parses the full callback URL, e.g.
    /// `https://host/oauth2callback?state=…&code=…&scope=…`.
    pub fn parse(callback_url: &str) -> AuthResult<Self> {
        let url = Url::parse(callback_url.trim()).map_err(|e| {
            AuthError::exchange_failed(format!("malformed callback URL: {}", e))
        })?;

        let mut params = Self {
            code: None,
            state: None,
            error: None,
            error_description: None,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(params)
    }

    /// Checks the callback against the pending login and returns the code.
    ///
    /// The state is checked before anything else so a forged callback never
    /// reaches the token endpoint.
    pub fn verify<'a>(&'a self, pending: &PendingLogin) -> AuthResult<&'a str> {
        match self.state.as_deref() {
            Some(state) if state == pending.state => {}
            Some(_) => {
                return Err(AuthError::state_mismatch(
                    "callback state does not match the issued state",
                ));
            }
            None => return Err(AuthError::state_mismatch("callback carries no state")),
        }

        if let Some(ref error) = self.error {
            let message = match self.error_description {
                Some(ref description) => format!("authorization denied: {}", description),
                None => "authorization denied".to_string(),
            };
            return Err(AuthError::exchange_failed(message).with_oauth_error(error.clone()));
        }

        self.code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AuthError::exchange_failed("missing authorization code in callback"))
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(bytes)
}

fn compute_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}
