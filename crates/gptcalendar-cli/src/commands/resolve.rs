//! Credential resolution and status commands.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use gptcalendar_auth::{
    AuthErrorCode, CredentialSource, LoginState, ResolvedCredential, Session,
};

use crate::commands::AuthContext;
use crate::config::{ClientConfig, GoogleSettings};
use crate::error::{ClientError, ClientResult};
use crate::session_file::SessionStore;

/// Resolves a credential and prints it.
pub async fn resolve(ctx: &AuthContext, json: bool) -> ClientResult<()> {
    let resolved = resolve_credential(ctx).await?;
    if json {
        let output = serde_json::to_string_pretty(&ResolveOutput::from(&resolved))
            .map_err(|e| ClientError::Config(format!("failed to serialize output: {}", e)))?;
        println!("{}", output);
    } else {
        print!("{}", render_resolved(&resolved, Utc::now()));
    }
    Ok(())
}

/// Runs the resolver against the session file, saving it back if a
/// refresh changed it.
pub(crate) async fn resolve_credential(ctx: &AuthContext) -> ClientResult<ResolvedCredential> {
    let mut session = ctx.store.load()?;
    let before = session.clone();

    let resolved = ctx
        .resolver
        .resolve(&ctx.persisted, &mut session)
        .await
        .map_err(|e| match e.code() {
            AuthErrorCode::Unavailable => ClientError::AuthRequired(
                "no usable credential; run `gptcalendar login`".to_string(),
            ),
            _ => ClientError::Auth(e),
        })?;

    if session != before {
        ctx.store.save(&session)?;
    }
    Ok(resolved)
}

/// JSON form of a resolved credential. Carries the full access token.
#[derive(Debug, Serialize)]
struct ResolveOutput<'a> {
    source: CredentialSource,
    refreshed: bool,
    access_token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiry: Option<DateTime<Utc>>,
    scopes: &'a [String],
}

impl<'a> From<&'a ResolvedCredential> for ResolveOutput<'a> {
    fn from(resolved: &'a ResolvedCredential) -> Self {
        Self {
            source: resolved.source,
            refreshed: resolved.refreshed,
            access_token: resolved.access_token(),
            expiry: resolved.credential.expiry,
            scopes: &resolved.credential.scopes,
        }
    }
}

fn render_resolved(resolved: &ResolvedCredential, now: DateTime<Utc>) -> String {
    let credential = &resolved.credential;
    let mut out = String::new();
    out.push_str(&format!("source:    {}\n", resolved.source));
    out.push_str(&format!(
        "refreshed: {}\n",
        if resolved.refreshed { "yes" } else { "no" }
    ));
    out.push_str(&format!("expires:   {}\n", describe_expiry(credential.expiry, now)));
    out.push_str(&format!(
        "token:     {}\n",
        credential.masked_access_token().unwrap_or_default()
    ));
    out.push_str(&format!("scopes:    {}\n", credential.scopes.join(" ")));
    out
}

fn describe_expiry(expiry: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    match expiry {
        Some(at) => {
            let stamp = at.to_rfc3339_opts(SecondsFormat::Secs, true);
            let minutes = (at - now).num_minutes();
            if minutes >= 0 {
                format!("{} (in {} min)", stamp, minutes)
            } else {
                format!("{} ({} min ago)", stamp, -minutes)
            }
        }
        None => "unknown".to_string(),
    }
}

/// Prints configured sources and session state without touching the
/// network.
pub fn status(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    let store = SessionStore::new(config.session_path());
    let session = store.load()?;
    let report = StatusReport {
        config_path,
        config_found: config_path.exists(),
        config,
        google: &config.google_settings(),
        session_path: store.path(),
        session: &session,
        now: Utc::now(),
    };
    print!("{}", report);
    Ok(())
}

struct StatusReport<'a> {
    config_path: &'a Path,
    config_found: bool,
    config: &'a ClientConfig,
    google: &'a GoogleSettings,
    session_path: &'a Path,
    session: &'a Session,
    now: DateTime<Utc>,
}

impl fmt::Display for StatusReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "config:         {} ({})",
            self.config_path.display(),
            if self.config_found { "found" } else { "not found" }
        )?;
        writeln!(
            f,
            "client_id:      {}",
            GoogleSettings::describe_field(self.google.client_id.as_deref())
        )?;
        writeln!(
            f,
            "client_secret:  {}",
            GoogleSettings::describe_field(self.google.client_secret.as_deref())
        )?;
        writeln!(
            f,
            "refresh_token:  {}",
            GoogleSettings::describe_field(self.google.refresh_token.as_deref())
        )?;
        let persistence = match self.config.persistence.mode {
            crate::config::PersistenceMode::Log => "log",
            crate::config::PersistenceMode::Config => "config",
            crate::config::PersistenceMode::Disabled => "disabled",
        };
        writeln!(f, "persistence:    {}", persistence)?;
        writeln!(f, "session:        {}", self.session_path.display())?;

        let state = match self.session.login_state() {
            LoginState::NotAuthenticated => "not authenticated",
            LoginState::PendingCallback => "waiting for callback",
            LoginState::Authenticated => "authenticated",
        };
        writeln!(f, "login:          {}", state)?;

        if let Some(ref pending) = self.session.pending {
            writeln!(
                f,
                "pending since:  {}",
                pending.issued_at.to_rfc3339_opts(SecondsFormat::Secs, true)
            )?;
        }

        if let Some(ref credential) = self.session.credential {
            let has_token = credential
                .access_token
                .as_deref()
                .is_some_and(|t| !t.is_empty());
            let refreshable = credential.can_refresh() && credential.is_complete();
            let condition = match (has_token, credential.is_expired_at(self.now), refreshable) {
                (true, false, _) => "valid",
                (true, true, true) => "expired, refreshable",
                (true, true, false) => "expired",
                (false, _, true) => "no access token, refreshable",
                (false, _, false) => "no access token",
            };
            writeln!(f, "credential:     {}", condition)?;
            writeln!(
                f,
                "expires:        {}",
                describe_expiry(credential.expiry, self.now)
            )?;
        }
        Ok(())
    }
}
