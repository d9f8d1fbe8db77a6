//! Credential resolution.
//!
//! [`CredentialResolver::resolve`] tries the credential sources in a fixed
//! order and returns the first usable credential:
//!
//! 1. **Persisted** – a refresh token from configuration. It is always
//!    refreshed, since no access token is kept alongside it. Any failure
//!    falls through to the next source.
//! 2. **Interactive** – the credential a browser login stored in the
//!    session. Used as is while valid, refreshed once when expired.
//!
//! If neither yields a credential the result is
//! [`AuthErrorCode::Unavailable`](crate::AuthErrorCode::Unavailable).
//! Refresh failures are logged and never escape `resolve`.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{AuthConfig, PersistedGrant};
use crate::credential::{Credential, CredentialSource};
use crate::endpoint::{CodeExchange, HttpTokenEndpoint, TokenEndpoint};
use crate::error::{AuthError, AuthResult};
use crate::login::{CallbackParams, LoginRedirect, PendingLogin};
use crate::session::Session;
use crate::sink::{CredentialSink, LogSink, PersistReason};

/// A credential ready to be handed to the Calendar API client.
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    pub credential: Credential,
    pub source: CredentialSource,
    /// Whether a refresh exchange ran during this resolution.
    pub refreshed: bool,
}

impl ResolvedCredential {
    /// The bearer token to send with API requests.
    pub fn access_token(&self) -> &str {
        self.credential.access_token.as_deref().unwrap_or_default()
    }
}

/// Produces usable credentials from configuration and session state.
pub struct CredentialResolver {
    config: AuthConfig,
    endpoint: Arc<dyn TokenEndpoint>,
    sink: Arc<dyn CredentialSink>,
}

impl std::fmt::Debug for CredentialResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialResolver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl CredentialResolver {
    /// Creates a resolver talking to the configured token endpoint over
    /// HTTP, logging new refresh tokens.
    pub fn new(config: AuthConfig) -> AuthResult<Self> {
        config.validate()?;
        let endpoint = HttpTokenEndpoint::new(config.timeout, &config.user_agent)?;
        Ok(Self {
            config,
            endpoint: Arc::new(endpoint),
            sink: Arc::new(LogSink),
        })
    }

    /// Creates a resolver with an explicit endpoint and sink.
    pub fn with_parts(
        config: AuthConfig,
        endpoint: Arc<dyn TokenEndpoint>,
        sink: Arc<dyn CredentialSink>,
    ) -> AuthResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            endpoint,
            sink,
        })
    }

    /// Replaces the credential sink.
    pub fn with_sink(mut self, sink: Arc<dyn CredentialSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Resolves a usable credential, refreshing as needed.
    ///
    /// On success from the interactive source the session's stored
    /// credential is updated with the refreshed access token. The pending
    /// login, if any, is left alone.
    pub async fn resolve(
        &self,
        persisted: &PersistedGrant,
        session: &mut Session,
    ) -> AuthResult<ResolvedCredential> {
        if let Some(resolved) = self.resolve_persisted(persisted).await {
            return Ok(resolved);
        }

        if let Some(resolved) = self.resolve_interactive(session).await {
            return Ok(resolved);
        }

        debug!("no credential source produced a usable credential");
        Err(AuthError::unavailable("not authenticated"))
    }

    async fn resolve_persisted(&self, grant: &PersistedGrant) -> Option<ResolvedCredential> {
        let mut credential =
            Credential::from_persisted(grant, &self.config.token_uri, self.config.scopes.clone())?;

        debug!("refreshing persisted credential");
        match self.refresh(&mut credential, CredentialSource::Persisted).await {
            Ok(()) => Some(ResolvedCredential {
                credential,
                source: CredentialSource::Persisted,
                refreshed: true,
            }),
            Err(err) => {
                warn!(
                    code = %err.code(),
                    oauth_error = err.oauth_error().unwrap_or("-"),
                    "persisted credential refresh failed, falling back to session: {}",
                    err.message()
                );
                None
            }
        }
    }

    async fn resolve_interactive(&self, session: &mut Session) -> Option<ResolvedCredential> {
        let stored = session.credential.as_ref()?;

        if stored.is_valid() {
            debug!("using session credential as is");
            return Some(ResolvedCredential {
                credential: stored.clone(),
                source: CredentialSource::Interactive,
                refreshed: false,
            });
        }

        if !stored.can_refresh() {
            debug!("session credential expired and has no refresh token");
            return None;
        }
        if !stored.is_complete() {
            warn!("session credential is missing client details, cannot refresh");
            return None;
        }

        let mut credential = stored.clone();
        debug!("refreshing expired session credential");
        match self
            .refresh(&mut credential, CredentialSource::Interactive)
            .await
        {
            Ok(()) => {
                session.credential = Some(credential.clone());
                Some(ResolvedCredential {
                    credential,
                    source: CredentialSource::Interactive,
                    refreshed: true,
                })
            }
            Err(err) => {
                warn!(
                    code = %err.code(),
                    oauth_error = err.oauth_error().unwrap_or("-"),
                    "session credential refresh failed: {}",
                    err.message()
                );
                None
            }
        }
    }

    /// Runs one refresh exchange and applies the result in place.
    async fn refresh(
        &self,
        credential: &mut Credential,
        source: CredentialSource,
    ) -> AuthResult<()> {
        let grant = self.endpoint.refresh(credential).await?;
        grant.validate().map_err(AuthError::invalid_response)?;

        let rotated = credential.apply_refresh(grant.access_token, grant.expires_in, grant.refresh_token);
        info!(%source, expires_at = ?credential.expiry, "access token refreshed");

        if rotated {
            self.offer_to_sink(credential, PersistReason::RefreshTokenRotated(source));
        }
        Ok(())
    }

    /// Starts an interactive login.
    pub fn begin_login(&self) -> AuthResult<LoginRedirect> {
        let redirect = PendingLogin::start(&self.config)?;
        debug!(redirect_uri = %redirect.pending.redirect_uri, "login started");
        Ok(redirect)
    }

    /// Starts a login and records it in the session, replacing any login
    /// still pending there. Returns the URL to send the browser to.
    pub fn begin_login_into(&self, session: &mut Session) -> AuthResult<String> {
        let redirect = self.begin_login()?;
        session.pending = Some(redirect.pending);
        Ok(redirect.authorization_url)
    }

    /// Completes a login from the full callback URL.
    ///
    /// The returned credential carries exactly the scopes that were
    /// requested. On success it is offered to the credential sink.
    pub async fn complete_login(
        &self,
        pending: &PendingLogin,
        callback_url: &str,
    ) -> AuthResult<Credential> {
        let params = CallbackParams::parse(callback_url)?;
        let code = params.verify(pending)?;

        let grant = self
            .endpoint
            .exchange_code(CodeExchange {
                token_uri: &self.config.token_uri,
                client_id: &self.config.credentials.client_id,
                client_secret: &self.config.credentials.client_secret,
                code,
                code_verifier: &pending.code_verifier,
                redirect_uri: &pending.redirect_uri,
            })
            .await?;

        grant.validate().map_err(AuthError::exchange_failed)?;

        if let Some(granted) = grant.granted_scopes() {
            let mut granted_sorted = granted.clone();
            granted_sorted.sort();
            let mut requested_sorted = pending.scopes.clone();
            requested_sorted.sort();
            if granted_sorted != requested_sorted {
                warn!(?granted, requested = ?pending.scopes, "granted scopes differ from requested scopes");
            }
        }
        if grant.refresh_token.is_none() {
            warn!("token endpoint issued no refresh token; the session cannot be refreshed");
        }

        let credential = Credential::issued(
            grant.access_token,
            grant.refresh_token,
            grant.expires_in,
            &self.config.token_uri,
            &self.config.credentials.client_id,
            &self.config.credentials.client_secret,
            pending.scopes.clone(),
        );

        info!("login completed");
        self.offer_to_sink(&credential, PersistReason::LoginCompleted);
        Ok(credential)
    }

    /// Completes the login pending in `session`.
    ///
    /// On success the credential is stored and the pending login cleared.
    /// On failure the session is left untouched.
    pub async fn complete_login_into(
        &self,
        session: &mut Session,
        callback_url: &str,
    ) -> AuthResult<Credential> {
        let pending = session
            .pending
            .as_ref()
            .ok_or_else(|| AuthError::state_mismatch("no login in progress"))?;

        let credential = self.complete_login(pending, callback_url).await?;
        session.pending = None;
        session.credential = Some(credential.clone());
        Ok(credential)
    }

    fn offer_to_sink(&self, credential: &Credential, reason: PersistReason) {
        if let Err(err) = self.sink.persist(credential, reason) {
            warn!(?reason, "failed to persist credential: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{Duration, Utc};

    use super::*;
    use crate::AuthErrorCode;
    use crate::config::{CALENDAR_EVENTS_SCOPE, OAuthCredentials};
    use crate::endpoint::{BoxFuture, TokenGrant};
    use crate::sink::MemorySink;

    const CLIENT_ID: &str = "test-client.apps.googleusercontent.com";
    const CLIENT_SECRET: &str = "test-secret";

    /// Replays queued responses and counts calls.
    #[derive(Default)]
    struct ScriptedEndpoint {
        refreshes: Mutex<VecDeque<AuthResult<TokenGrant>>>,
        exchanges: Mutex<VecDeque<AuthResult<TokenGrant>>>,
        refresh_calls: AtomicUsize,
        exchange_calls: AtomicUsize,
        refreshed_tokens: Mutex<Vec<String>>,
        exchanged_codes: Mutex<Vec<(String, String)>>,
    }

    impl ScriptedEndpoint {
        fn on_refresh(self, result: AuthResult<TokenGrant>) -> Self {
            self.refreshes.lock().unwrap().push_back(result);
            self
        }

        fn on_exchange(self, result: AuthResult<TokenGrant>) -> Self {
            self.exchanges.lock().unwrap().push_back(result);
            self
        }

        fn refresh_calls(&self) -> usize {
            self.refresh_calls.load(Ordering::SeqCst)
        }

        fn exchange_calls(&self) -> usize {
            self.exchange_calls.load(Ordering::SeqCst)
        }
    }

    impl TokenEndpoint for ScriptedEndpoint {
        fn exchange_code<'a>(
            &'a self,
            request: CodeExchange<'a>,
        ) -> BoxFuture<'a, AuthResult<TokenGrant>> {
            self.exchange_calls.fetch_add(1, Ordering::SeqCst);
            self.exchanged_codes
                .lock()
                .unwrap()
                .push((request.code.to_string(), request.code_verifier.to_string()));
            let next = self
                .exchanges
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AuthError::exchange_failed("unscripted exchange")));
            Box::pin(async move { next })
        }

        fn refresh<'a>(&'a self, credential: &'a Credential) -> BoxFuture<'a, AuthResult<TokenGrant>> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            self.refreshed_tokens
                .lock()
                .unwrap()
                .push(credential.refresh_token.clone().unwrap_or_default());
            let next = self
                .refreshes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(AuthError::refresh_failed("unscripted refresh")));
            Box::pin(async move { next })
        }
    }

    fn grant(access_token: &str, refresh_token: Option<&str>) -> TokenGrant {
        TokenGrant {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_in: Some(3599),
            scope: Some(CALENDAR_EVENTS_SCOPE.to_string()),
            token_type: Some("Bearer".to_string()),
        }
    }

    fn invalid_grant() -> AuthError {
        AuthError::refresh_failed("token refresh rejected (400 Bad Request)")
            .with_oauth_error("invalid_grant")
    }

    fn config() -> AuthConfig {
        AuthConfig::new(OAuthCredentials::new(CLIENT_ID, CLIENT_SECRET))
            .with_redirect_uri("https://calendar.example.com/oauth2callback")
    }

    fn resolver(endpoint: Arc<ScriptedEndpoint>, sink: Arc<MemorySink>) -> CredentialResolver {
        CredentialResolver::with_parts(config(), endpoint, sink).unwrap()
    }

    fn persisted(refresh_token: &str) -> PersistedGrant {
        PersistedGrant::for_client(
            &OAuthCredentials::new(CLIENT_ID, CLIENT_SECRET),
            Some(refresh_token.to_string()),
        )
    }

    fn session_credential(expires_in: i64, refresh_token: Option<&str>) -> Credential {
        Credential::issued(
            "ya29.session",
            refresh_token.map(str::to_string),
            Some(expires_in),
            crate::config::GOOGLE_TOKEN_URI,
            CLIENT_ID,
            CLIENT_SECRET,
            vec![CALENDAR_EVENTS_SCOPE.to_string()],
        )
    }

    #[tokio::test]
    async fn persisted_source_needs_no_session() {
        let endpoint = Arc::new(ScriptedEndpoint::default().on_refresh(Ok(grant("ya29.p", None))));
        let resolver = resolver(endpoint.clone(), Arc::new(MemorySink::new()));
        let mut session = Session::new();

        let resolved = resolver
            .resolve(&persisted("1//persisted"), &mut session)
            .await
            .unwrap();

        assert_eq!(resolved.source, CredentialSource::Persisted);
        assert!(resolved.refreshed);
        assert!(resolved.credential.is_valid());
        assert_eq!(resolved.access_token(), "ya29.p");
        assert_eq!(
            resolved.credential.refresh_token.as_deref(),
            Some("1//persisted")
        );
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(
            *endpoint.refreshed_tokens.lock().unwrap(),
            vec!["1//persisted".to_string()]
        );
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn valid_session_credential_is_returned_unchanged() {
        let endpoint = Arc::new(ScriptedEndpoint::default());
        let resolver = resolver(endpoint.clone(), Arc::new(MemorySink::new()));
        let stored = session_credential(3600, Some("1//session"));
        let mut session = Session::with_credential(stored.clone());

        let resolved = resolver
            .resolve(&PersistedGrant::none(), &mut session)
            .await
            .unwrap();

        assert_eq!(resolved.source, CredentialSource::Interactive);
        assert!(!resolved.refreshed);
        assert_eq!(resolved.credential, stored);
        assert_eq!(session.credential, Some(stored));
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn expired_session_credential_is_refreshed_once() {
        let endpoint =
            Arc::new(ScriptedEndpoint::default().on_refresh(Ok(grant("ya29.refreshed", None))));
        let resolver = resolver(endpoint.clone(), Arc::new(MemorySink::new()));
        let mut session = Session::with_credential(session_credential(-10, Some("1//session")));

        let resolved = resolver
            .resolve(&PersistedGrant::none(), &mut session)
            .await
            .unwrap();

        assert_eq!(endpoint.refresh_calls(), 1);
        assert!(resolved.refreshed);
        assert_eq!(resolved.access_token(), "ya29.refreshed");
        assert!(resolved.credential.expiry.unwrap() > Utc::now() + Duration::minutes(30));

        let stored = session.credential.as_ref().unwrap();
        assert_eq!(stored.access_token.as_deref(), Some("ya29.refreshed"));
        assert_eq!(stored.refresh_token.as_deref(), Some("1//session"));
    }

    #[tokio::test]
    async fn nothing_configured_is_unavailable() {
        let endpoint = Arc::new(ScriptedEndpoint::default());
        let resolver = resolver(endpoint.clone(), Arc::new(MemorySink::new()));
        let mut session = Session::new();

        let err = resolver
            .resolve(&PersistedGrant::none(), &mut session)
            .await
            .unwrap_err();

        assert_eq!(err.code(), AuthErrorCode::Unavailable);
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn rejected_persisted_token_falls_back_to_session() {
        let endpoint = Arc::new(ScriptedEndpoint::default().on_refresh(Err(invalid_grant())));
        let resolver = resolver(endpoint.clone(), Arc::new(MemorySink::new()));
        let stored = session_credential(3600, Some("1//session"));
        let mut session = Session::with_credential(stored.clone());

        let resolved = resolver
            .resolve(&persisted("1//revoked"), &mut session)
            .await
            .unwrap();

        assert_eq!(resolved.source, CredentialSource::Interactive);
        assert_eq!(resolved.credential, stored);
        assert_eq!(endpoint.refresh_calls(), 1);
    }

    #[tokio::test]
    async fn rejected_persisted_token_without_session_is_unavailable() {
        let endpoint = Arc::new(ScriptedEndpoint::default().on_refresh(Err(invalid_grant())));
        let resolver = resolver(endpoint, Arc::new(MemorySink::new()));
        let mut session = Session::new();

        let err = resolver
            .resolve(&persisted("1//revoked"), &mut session)
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Unavailable);
    }

    #[tokio::test]
    async fn out_of_range_lifetime_falls_through_to_session() {
        let mut huge = grant("ya29.p", None);
        huge.expires_in = Some(i64::MAX);
        let endpoint = Arc::new(ScriptedEndpoint::default().on_refresh(Ok(huge)));
        let with_session = resolver(endpoint, Arc::new(MemorySink::new()));
        let stored = session_credential(3600, Some("1//session"));
        let mut session = Session::with_credential(stored.clone());

        let resolved = with_session
            .resolve(&persisted("1//persisted"), &mut session)
            .await
            .unwrap();
        assert_eq!(resolved.source, CredentialSource::Interactive);
        assert_eq!(resolved.credential, stored);

        let mut negative = grant("ya29.p", None);
        negative.expires_in = Some(-5);
        let endpoint = Arc::new(ScriptedEndpoint::default().on_refresh(Ok(negative)));
        let without_session = resolver(endpoint, Arc::new(MemorySink::new()));
        let err = without_session
            .resolve(&persisted("1//persisted"), &mut Session::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Unavailable);
    }

    #[tokio::test]
    async fn out_of_range_lifetime_rejects_login() {
        let mut huge = grant("ya29.first", Some("1//issued"));
        huge.expires_in = Some(i64::MAX);
        let endpoint = Arc::new(ScriptedEndpoint::default().on_exchange(Ok(huge)));
        let resolver = resolver(endpoint, Arc::new(MemorySink::new()));
        let mut session = Session::new();
        resolver.begin_login_into(&mut session).unwrap();
        let state = session.pending.as_ref().unwrap().state.clone();
        let before = session.clone();

        let err = resolver
            .complete_login_into(
                &mut session,
                &format!("https://calendar.example.com/oauth2callback?state={}&code=ok", state),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::ExchangeFailed);
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn incomplete_persisted_grant_is_skipped() {
        let endpoint = Arc::new(ScriptedEndpoint::default());
        let resolver = resolver(endpoint.clone(), Arc::new(MemorySink::new()));
        let grant = PersistedGrant {
            refresh_token: Some("1//persisted".into()),
            client_id: Some(CLIENT_ID.into()),
            client_secret: None,
        };

        let err = resolver
            .resolve(&grant, &mut Session::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::Unavailable);
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn failed_session_refresh_is_unavailable_and_keeps_session() {
        let endpoint = Arc::new(ScriptedEndpoint::default().on_refresh(Err(invalid_grant())));
        let resolver = resolver(endpoint.clone(), Arc::new(MemorySink::new()));
        let stored = session_credential(-10, Some("1//session"));
        let mut session = Session::with_credential(stored.clone());

        let err = resolver
            .resolve(&PersistedGrant::none(), &mut session)
            .await
            .unwrap_err();

        assert_eq!(err.code(), AuthErrorCode::Unavailable);
        assert_eq!(endpoint.refresh_calls(), 1);
        assert_eq!(session.credential, Some(stored));
    }

    #[tokio::test]
    async fn expired_session_without_refresh_token_is_unavailable() {
        let endpoint = Arc::new(ScriptedEndpoint::default());
        let resolver = resolver(endpoint.clone(), Arc::new(MemorySink::new()));
        let mut session = Session::with_credential(session_credential(-10, None));

        let err = resolver
            .resolve(&PersistedGrant::none(), &mut session)
            .await
            .unwrap_err();

        assert_eq!(err.code(), AuthErrorCode::Unavailable);
        assert_eq!(endpoint.refresh_calls(), 0);
    }

    #[tokio::test]
    async fn persisted_source_wins_over_session() {
        let endpoint = Arc::new(ScriptedEndpoint::default().on_refresh(Ok(grant("ya29.p", None))));
        let resolver = resolver(endpoint.clone(), Arc::new(MemorySink::new()));
        let stored = session_credential(3600, Some("1//session"));
        let mut session = Session::with_credential(stored.clone());

        let resolved = resolver
            .resolve(&persisted("1//persisted"), &mut session)
            .await
            .unwrap();

        assert_eq!(resolved.source, CredentialSource::Persisted);
        assert_eq!(session.credential, Some(stored));
    }

    #[tokio::test]
    async fn rotated_refresh_token_is_offered_to_sink() {
        let endpoint = Arc::new(
            ScriptedEndpoint::default().on_refresh(Ok(grant("ya29.p", Some("1//rotated")))),
        );
        let sink = Arc::new(MemorySink::new());
        let resolver = resolver(endpoint, sink.clone());

        let resolved = resolver
            .resolve(&persisted("1//persisted"), &mut Session::new())
            .await
            .unwrap();

        assert_eq!(
            resolved.credential.refresh_token.as_deref(),
            Some("1//rotated")
        );
        let persisted = sink.persisted();
        assert_eq!(persisted.len(), 1);
        assert_eq!(
            persisted[0].1,
            PersistReason::RefreshTokenRotated(CredentialSource::Persisted)
        );
    }

    #[tokio::test]
    async fn unrotated_refresh_is_not_persisted() {
        let endpoint = Arc::new(ScriptedEndpoint::default().on_refresh(Ok(grant("ya29.p", None))));
        let sink = Arc::new(MemorySink::new());
        let resolver = resolver(endpoint, sink.clone());

        resolver
            .resolve(&persisted("1//persisted"), &mut Session::new())
            .await
            .unwrap();
        assert!(sink.persisted().is_empty());
    }

    #[tokio::test]
    async fn login_roundtrip_keeps_requested_scopes() {
        let endpoint = Arc::new(
            ScriptedEndpoint::default().on_exchange(Ok(grant("ya29.first", Some("1//issued")))),
        );
        let sink = Arc::new(MemorySink::new());
        let resolver = resolver(endpoint.clone(), sink.clone());
        let mut session = Session::new();

        resolver.begin_login_into(&mut session).unwrap();
        let pending = session.pending.clone().unwrap();
        let callback = format!(
            "https://calendar.example.com/oauth2callback?state={}&code=auth-code",
            pending.state
        );

        let credential = resolver
            .complete_login_into(&mut session, &callback)
            .await
            .unwrap();

        assert_eq!(credential.scopes, vec![CALENDAR_EVENTS_SCOPE.to_string()]);
        assert_eq!(credential.scopes, pending.scopes);
        assert_eq!(credential.refresh_token.as_deref(), Some("1//issued"));
        assert_eq!(credential.client_id, CLIENT_ID);
        assert!(credential.is_valid());

        assert!(session.pending.is_none());
        assert_eq!(session.credential, Some(credential));
        assert_eq!(
            *endpoint.exchanged_codes.lock().unwrap(),
            vec![("auth-code".to_string(), pending.code_verifier.clone())]
        );

        let persisted = sink.persisted();
        assert_eq!(persisted.len(), 1);
        assert_eq!(persisted[0].1, PersistReason::LoginCompleted);
    }

    #[tokio::test]
    async fn state_mismatch_leaves_session_untouched() {
        let endpoint = Arc::new(ScriptedEndpoint::default());
        let sink = Arc::new(MemorySink::new());
        let resolver = resolver(endpoint.clone(), sink.clone());
        let mut session = Session::with_credential(session_credential(3600, Some("1//old")));
        resolver.begin_login_into(&mut session).unwrap();
        let before = session.clone();

        let err = resolver
            .complete_login_into(
                &mut session,
                "https://calendar.example.com/oauth2callback?state=forged&code=auth-code",
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), AuthErrorCode::StateMismatch);
        assert_eq!(session, before);
        assert_eq!(endpoint.exchange_calls(), 0);
        assert!(sink.persisted().is_empty());
    }

    #[tokio::test]
    async fn completing_without_pending_login_is_state_mismatch() {
        let endpoint = Arc::new(ScriptedEndpoint::default());
        let resolver = resolver(endpoint, Arc::new(MemorySink::new()));
        let mut session = Session::new();

        let err = resolver
            .complete_login_into(
                &mut session,
                "https://calendar.example.com/oauth2callback?state=x&code=y",
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::StateMismatch);
        assert!(session.is_empty());
    }

    #[tokio::test]
    async fn rejected_code_is_exchange_failed() {
        let endpoint = Arc::new(ScriptedEndpoint::default().on_exchange(Err(
            AuthError::exchange_failed("token exchange rejected (400 Bad Request)")
                .with_oauth_error("invalid_grant"),
        )));
        let resolver = resolver(endpoint, Arc::new(MemorySink::new()));
        let mut session = Session::new();
        resolver.begin_login_into(&mut session).unwrap();
        let state = session.pending.as_ref().unwrap().state.clone();
        let before = session.clone();

        let err = resolver
            .complete_login_into(
                &mut session,
                &format!("https://calendar.example.com/oauth2callback?state={}&code=stale", state),
            )
            .await
            .unwrap_err();

        assert_eq!(err.code(), AuthErrorCode::ExchangeFailed);
        assert!(err.code().rejects_callback());
        assert_eq!(session, before);
    }

    #[tokio::test]
    async fn new_login_replaces_pending_state() {
        let resolver = resolver(
            Arc::new(ScriptedEndpoint::default()),
            Arc::new(MemorySink::new()),
        );
        let mut session = Session::new();
        resolver.begin_login_into(&mut session).unwrap();
        let first = session.pending.clone().unwrap();
        resolver.begin_login_into(&mut session).unwrap();
        assert_ne!(session.pending.as_ref().unwrap().state, first.state);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = config().with_scopes(vec![]);
        let err = CredentialResolver::with_parts(
            config,
            Arc::new(ScriptedEndpoint::default()),
            Arc::new(MemorySink::new()),
        )
        .unwrap_err();
        assert_eq!(err.code(), AuthErrorCode::ConfigurationError);
    }
}
