//! Command implementations.

pub mod auth;
pub mod config;
pub mod resolve;

use std::path::{Path, PathBuf};

use gptcalendar_auth::{CredentialResolver, PersistedGrant};

use crate::config::{ClientConfig, GoogleSettings, PersistenceMode};
use crate::error::{ClientError, ClientResult};
use crate::session_file::SessionStore;

/// Everything the auth commands need, built from configuration.
pub struct AuthContext {
    pub resolver: CredentialResolver,
    pub persisted: PersistedGrant,
    pub store: SessionStore,
    pub persistence: PersistenceMode,
    pub config_path: PathBuf,
}

impl AuthContext {
    /// Builds the context, resolving secrets and falling back to the
    /// environment for missing credentials.
    pub fn from_config(config: &ClientConfig, config_path: &Path) -> ClientResult<Self> {
        Self::from_settings(config, &config.google_settings(), config_path)
    }

    pub(crate) fn from_settings(
        config: &ClientConfig,
        google: &GoogleSettings,
        config_path: &Path,
    ) -> ClientResult<Self> {
        let auth_config = google
            .to_auth_config()
            .map_err(|e| ClientError::Config(format!("invalid Google settings: {}", e)))?;
        let persisted = google.persisted_grant(&auth_config.credentials);

        let sink = crate::sink::for_mode(config.persistence.mode, config_path);
        let resolver = CredentialResolver::new(auth_config)?.with_sink(sink);

        Ok(Self {
            resolver,
            persisted,
            store: SessionStore::new(config.session_path()),
            persistence: config.persistence.mode,
            config_path: config_path.to_path_buf(),
        })
    }
}
