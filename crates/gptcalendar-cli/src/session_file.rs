//! File-backed session storage.
//!
//! The CLI has no cookie jar, so the [`Session`] lives in a JSON file
//! between invocations. Writes go through a temp file and a rename, and the
//! file is restricted to the owner on Unix.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use gptcalendar_auth::Session;

use crate::error::{ClientError, ClientResult};

/// Reads and writes a [`Session`] at a fixed path.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the session, or an empty one if no file exists yet.
    pub fn load(&self) -> ClientResult<Session> {
        if !self.path.exists() {
            debug!("no session file at {:?}", self.path);
            return Ok(Session::new());
        }

        let content = fs::read_to_string(&self.path).map_err(|e| {
            ClientError::Session(format!("failed to read {}: {}", self.path.display(), e))
        })?;

        serde_json::from_str(&content).map_err(|e| {
            ClientError::Session(format!(
                "failed to parse {}: {} (run `gptcalendar logout` to reset it)",
                self.path.display(),
                e
            ))
        })
    }

    /// Saves the session, replacing the file atomically.
    pub fn save(&self, session: &Session) -> ClientResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                ClientError::Session(format!("failed to create session directory: {}", e))
            })?;
        }

        let temp_path = self.path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(session)
            .map_err(|e| ClientError::Session(format!("failed to serialize session: {}", e)))?;

        fs::write(&temp_path, &content)
            .map_err(|e| ClientError::Session(format!("failed to write session file: {}", e)))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&temp_path, fs::Permissions::from_mode(0o600)).map_err(|e| {
                ClientError::Session(format!("failed to restrict session file: {}", e))
            })?;
        }

        fs::rename(&temp_path, &self.path)
            .map_err(|e| ClientError::Session(format!("failed to rename session file: {}", e)))?;

        debug!("saved session to {:?}", self.path);
        Ok(())
    }

    /// Deletes the session file. Returns false if there was none.
    pub fn clear(&self) -> ClientResult<bool> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(ClientError::Session(format!(
                "failed to remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}
