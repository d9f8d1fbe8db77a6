//! Writes newly issued refresh tokens back into `config.toml`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{info, warn};

use gptcalendar_auth::{
    AuthError, AuthResult, Credential, CredentialSink, LogSink, NoopSink, PersistReason,
};

use crate::config::PersistenceMode;
use crate::secret::SecretRef;

/// Stores the refresh token under `[google]` in a TOML config file,
/// preserving everything else in it.
#[derive(Debug, Clone)]
pub struct ConfigFileSink {
    path: PathBuf,
}

impl ConfigFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialSink for ConfigFileSink {
    fn persist(&self, credential: &Credential, reason: PersistReason) -> AuthResult<()> {
        let Some(refresh_token) = credential.refresh_token.as_deref() else {
            return Ok(());
        };

        let content = if self.path.exists() {
            std::fs::read_to_string(&self.path).map_err(|e| {
                AuthError::persistence(format!("failed to read {}: {}", self.path.display(), e))
                    .with_source(e)
            })?
        } else {
            String::new()
        };

        let mut doc = content.parse::<toml_edit::DocumentMut>().map_err(|e| {
            AuthError::persistence(format!("failed to parse {}: {}", self.path.display(), e))
        })?;

        if !doc.contains_key("google") {
            doc["google"] = toml_edit::Item::Table(toml_edit::Table::new());
        }
        let google = doc["google"].as_table_mut().ok_or_else(|| {
            AuthError::persistence("`google` in config.toml is not a table")
        })?;

        if let Some(previous) = google.get("refresh_token").and_then(|item| item.as_str()) {
            if SecretRef::parse(previous).is_reference() {
                warn!(
                    "replacing refresh_token reference {} with the new token",
                    SecretRef::parse(previous)
                );
            }
        }
        google["refresh_token"] = toml_edit::value(refresh_token);

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AuthError::persistence(format!(
                    "failed to create config directory {}: {}",
                    parent.display(),
                    e
                ))
                .with_source(e)
            })?;
        }

        std::fs::write(&self.path, doc.to_string()).map_err(|e| {
            AuthError::persistence(format!("failed to write {}: {}", self.path.display(), e))
                .with_source(e)
        })?;

        info!(?reason, "refresh token saved to {}", self.path.display());
        Ok(())
    }
}

/// Picks the sink for the configured persistence mode.
pub fn for_mode(mode: PersistenceMode, config_path: &Path) -> Arc<dyn CredentialSink> {
    match mode {
        PersistenceMode::Log => Arc::new(LogSink),
        PersistenceMode::Config => Arc::new(ConfigFileSink::new(config_path)),
        PersistenceMode::Disabled => Arc::new(NoopSink),
    }
}
