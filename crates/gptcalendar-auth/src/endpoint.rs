//! Token endpoint client.
//!
//! [`TokenEndpoint`] is the seam between the resolver and the network: the
//! production [`HttpTokenEndpoint`] posts form-encoded requests to Google,
//! tests swap in scripted implementations.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::credential::{Credential, MAX_EXPIRES_IN_SECS};
use crate::error::{AuthError, AuthResult};

/// A boxed future, keeping [`TokenEndpoint`] object-safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Tokens returned by a successful exchange or refresh.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Space-separated scopes actually granted.
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("refresh_token", &self.refresh_token.is_some())
            .field("expires_in", &self.expires_in)
            .field("scope", &self.scope)
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

impl TokenGrant {
    /// Checks the fields a credential is built from.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.access_token.is_empty() {
            return Err("token endpoint returned an empty access token");
        }
        match self.expires_in {
            Some(secs) if !(0..=MAX_EXPIRES_IN_SECS).contains(&secs) => {
                Err("token endpoint returned an out-of-range expires_in")
            }
            _ => Ok(()),
        }
    }

    /// Granted scopes as a list, if the endpoint reported them.
    pub fn granted_scopes(&self) -> Option<Vec<String>> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
    }
}

/// Parameters for an authorization-code exchange.
#[derive(Debug, Clone, Copy)]
pub struct CodeExchange<'a> {
    pub token_uri: &'a str,
    pub client_id: &'a str,
    pub client_secret: &'a str,
    pub code: &'a str,
    pub code_verifier: &'a str,
    pub redirect_uri: &'a str,
}

/// The OAuth token endpoint, as seen by the resolver.
pub trait TokenEndpoint: Send + Sync {
    /// Trades an authorization code for tokens.
    ///
    /// Rejections map to [`AuthErrorCode::ExchangeFailed`](crate::AuthErrorCode::ExchangeFailed).
    fn exchange_code<'a>(&'a self, request: CodeExchange<'a>) -> BoxFuture<'a, AuthResult<TokenGrant>>;

    /// Trades the credential's refresh token for a new access token, using
    /// the credential's own token URI and client.
    ///
    /// Rejections map to [`AuthErrorCode::RefreshFailed`](crate::AuthErrorCode::RefreshFailed).
    fn refresh<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, AuthResult<TokenGrant>>;
}

/// Error body returned by OAuth endpoints.
#[derive(Debug, Deserialize)]
struct OAuthErrorBody {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Which kind of request failed, to pick the right error code.
#[derive(Debug, Clone, Copy)]
enum GrantKind {
    AuthorizationCode,
    RefreshToken,
}

impl GrantKind {
    fn label(self) -> &'static str {
        match self {
            Self::AuthorizationCode => "token exchange",
            Self::RefreshToken => "token refresh",
        }
    }

    fn rejected(self, message: String) -> AuthError {
        match self {
            Self::AuthorizationCode => AuthError::exchange_failed(message),
            Self::RefreshToken => AuthError::refresh_failed(message),
        }
    }
}

/// [`TokenEndpoint`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTokenEndpoint {
    http_client: reqwest::Client,
}

impl HttpTokenEndpoint {
    /// Creates an endpoint client with the given request timeout.
    pub fn new(timeout: Duration, user_agent: &str) -> AuthResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                AuthError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;
        Ok(Self { http_client })
    }

    async fn post_form(
        &self,
        kind: GrantKind,
        token_uri: &str,
        params: &[(&str, &str)],
    ) -> AuthResult<TokenGrant> {
        debug!(token_uri, "sending {}", kind.label());

        let response = self
            .http_client
            .post(token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    format!("{} timed out", kind.label())
                } else if e.is_connect() {
                    format!("{} connection failed: {}", kind.label(), e)
                } else {
                    format!("{} request failed: {}", kind.label(), e)
                };
                AuthError::network(message).with_source(e)
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AuthError::network(format!("failed to read token response: {}", e)).with_source(e)
        })?;

        if !status.is_success() {
            let message = format!("{} rejected ({})", kind.label(), status);
            let err = match serde_json::from_str::<OAuthErrorBody>(&body) {
                Ok(parsed) => {
                    let message = match parsed.error_description {
                        Some(description) => format!("{}: {}", message, description),
                        None => message,
                    };
                    kind.rejected(message).with_oauth_error(parsed.error)
                }
                Err(_) => kind.rejected(format!("{}: {}", message, body.trim())),
            };
            return Err(err);
        }

        let grant: TokenGrant = serde_json::from_str(&body).map_err(|e| {
            AuthError::invalid_response(format!("invalid token response: {}", e)).with_source(e)
        })?;

        info!("{} succeeded", kind.label());
        Ok(grant)
    }
}

impl TokenEndpoint for HttpTokenEndpoint {
    fn exchange_code<'a>(&'a self, request: CodeExchange<'a>) -> BoxFuture<'a, AuthResult<TokenGrant>> {
        Box::pin(async move {
            let params = [
                ("grant_type", "authorization_code"),
                ("code", request.code),
                ("code_verifier", request.code_verifier),
                ("redirect_uri", request.redirect_uri),
                ("client_id", request.client_id),
                ("client_secret", request.client_secret),
            ];
            self.post_form(GrantKind::AuthorizationCode, request.token_uri, &params)
                .await
        })
    }

    fn refresh<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, AuthResult<TokenGrant>> {
        Box::pin(async move {
            let refresh_token = credential
                .refresh_token
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| AuthError::refresh_failed("credential has no refresh token"))?;

            let params = [
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", credential.client_id.as_str()),
                ("client_secret", credential.client_secret.as_str()),
            ];
            self.post_form(GrantKind::RefreshToken, &credential.token_uri, &params)
                .await
        })
    }
}
