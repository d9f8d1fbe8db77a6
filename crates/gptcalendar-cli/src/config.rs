//! Client configuration.
//!
//! All settings live in a single `config.toml` file at
//! `~/.config/gptcalendar/config.toml` by default.
//!
//! Credential values (`client_id`, `client_secret`, `refresh_token`) support
//! secret references:
//! - `pass::path/in/store`, resolved via `pass show`
//! - `env::VAR_NAME`, resolved from the environment
//! - plain text, used as-is
//!
//! Credential fields missing from the file fall back to the
//! `GOOGLE_CLIENT_ID`, `GOOGLE_CLIENT_SECRET` and `GOOGLE_REFRESH_TOKEN`
//! environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use gptcalendar_auth::{AuthConfig, OAuthCredentials, PersistedGrant};

use crate::secret::{self, SecretRef};

pub const CLIENT_ID_ENV: &str = "GOOGLE_CLIENT_ID";
pub const CLIENT_SECRET_ENV: &str = "GOOGLE_CLIENT_SECRET";
pub const REFRESH_TOKEN_ENV: &str = "GOOGLE_REFRESH_TOKEN";

// ---------------------------------------------------------------------------
// ClientConfig (config.toml)
// ---------------------------------------------------------------------------

/// Configuration for the gptcalendar CLI.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Google OAuth settings.
    pub google: Option<GoogleSettings>,

    /// What happens to newly issued refresh tokens.
    pub persistence: PersistenceSettings,

    /// Where the interactive session is kept.
    pub session: SessionSettings,
}

/// Refresh token persistence settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceSettings {
    pub mode: PersistenceMode,
}

/// How a newly issued refresh token is handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistenceMode {
    /// Log it for an operator to copy into configuration.
    #[default]
    Log,
    /// Write it into `config.toml`.
    Config,
    /// Drop it.
    Disabled,
}

/// Session file settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Path to the session file.
    pub path: Option<PathBuf>,
}

impl ClientConfig {
    /// Loads configuration from the default path.
    pub fn load() -> Result<Self, String> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let content =
            std::fs::read_to_string(path).map_err(|e| format!("failed to read config: {}", e))?;
        toml::from_str(&content).map_err(|e| format!("failed to parse config: {}", e))
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        Self::default_config_dir().join("config.toml")
    }

    /// Returns the default configuration directory.
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gptcalendar")
    }

    /// Returns the default data directory path.
    pub fn default_data_dir() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("gptcalendar")
    }

    /// Returns the session file path.
    pub fn session_path(&self) -> PathBuf {
        self.session
            .path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join("session.json"))
    }

    /// Google settings with missing credential fields taken from the
    /// process environment.
    pub fn google_settings(&self) -> GoogleSettings {
        self.google_settings_with(|var| std::env::var(var).ok())
    }

    pub(crate) fn google_settings_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> GoogleSettings {
        self.google.clone().unwrap_or_default().with_env_fallback(lookup)
    }
}

// ---------------------------------------------------------------------------
// GoogleSettings (in config.toml, including credentials)
// ---------------------------------------------------------------------------

/// Google OAuth settings.
///
/// Credentials are stored inline and support secret references
/// (`pass::…`, `env::…`).
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GoogleSettings {
    /// OAuth client ID (supports `pass::` and `env::` prefixes).
    pub client_id: Option<String>,

    /// OAuth client secret (supports `pass::` and `env::` prefixes).
    pub client_secret: Option<String>,

    /// Long-lived refresh token for the persisted source.
    pub refresh_token: Option<String>,

    /// Callback URL registered with the OAuth client.
    pub redirect_uri: Option<String>,

    /// Scopes requested during login.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,

    /// Authorization endpoint, for pointing at a non-Google server.
    pub auth_uri: Option<String>,

    /// Token endpoint used for code exchange and refresh.
    pub token_uri: Option<String>,

    /// Token endpoint request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

impl GoogleSettings {
    /// Fills unset credential fields from environment variables.
    pub fn with_env_fallback(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let from_env = |var: &str| lookup(var).filter(|v| !v.is_empty());
        if self.client_id.is_none() {
            self.client_id = from_env(CLIENT_ID_ENV);
        }
        if self.client_secret.is_none() {
            self.client_secret = from_env(CLIENT_SECRET_ENV);
        }
        if self.refresh_token.is_none() {
            self.refresh_token = from_env(REFRESH_TOKEN_ENV);
        }
        self
    }

    /// Resolves the OAuth client from inline fields.
    ///
    /// Both `client_id` and `client_secret` must be set. Each value is passed
    /// through `secret::resolve()` to expand `pass::` and `env::` references.
    pub fn resolve_credentials(&self) -> Result<OAuthCredentials, String> {
        let raw_id = self.client_id.as_deref().ok_or_else(|| {
            format!(
                "Google credentials not found. Add to {}:\n  \
                 [google]\n  \
                 client_id = \"YOUR_ID.apps.googleusercontent.com\"\n  \
                 client_secret = \"YOUR_SECRET\"\n\n  \
                 Or set {} and {}",
                ClientConfig::default_path().display(),
                CLIENT_ID_ENV,
                CLIENT_SECRET_ENV
            )
        })?;

        let raw_secret = self.client_secret.as_deref().ok_or_else(|| {
            format!(
                "client_secret is missing from [google] in config.toml and {} is not set",
                CLIENT_SECRET_ENV
            )
        })?;

        let resolved_id =
            secret::resolve(raw_id).map_err(|e| format!("failed to resolve client_id: {}", e))?;
        let resolved_secret = secret::resolve(raw_secret)
            .map_err(|e| format!("failed to resolve client_secret: {}", e))?;

        Ok(OAuthCredentials::new(resolved_id, resolved_secret))
    }

    /// Builds the resolver configuration.
    pub fn to_auth_config(&self) -> Result<AuthConfig, String> {
        let credentials = self.resolve_credentials()?;
        credentials.validate().map_err(|e| e.to_string())?;

        let mut config = AuthConfig::new(credentials);
        if let Some(ref uri) = self.redirect_uri {
            config = config.with_redirect_uri(uri);
        }
        if !self.scopes.is_empty() {
            config = config.with_scopes(self.scopes.clone());
        }
        if let Some(ref uri) = self.auth_uri {
            config = config.with_auth_uri(uri);
        }
        if let Some(ref uri) = self.token_uri {
            config = config.with_token_uri(uri);
        }
        if let Some(secs) = self.timeout_secs {
            config = config.with_timeout(Duration::from_secs(secs));
        }

        config.validate().map_err(|e| e.message().to_string())?;
        Ok(config)
    }

    /// The persisted grant for the resolver.
    ///
    /// A refresh token that cannot be resolved disables the persisted
    /// source instead of failing.
    pub fn persisted_grant(&self, credentials: &OAuthCredentials) -> PersistedGrant {
        let refresh_token = self.refresh_token.as_deref().and_then(|raw| {
            match secret::resolve(raw) {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!("ignoring refresh_token: {}", e);
                    None
                }
            }
        });
        PersistedGrant::for_client(credentials, refresh_token)
    }

    /// Describes where each credential field comes from, for display.
    pub fn describe_field(value: Option<&str>) -> String {
        match value {
            Some(raw) => SecretRef::parse(raw).to_string(),
            None => "not set".to_string(),
        }
    }
}
