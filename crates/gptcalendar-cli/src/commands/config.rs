//! Configuration commands.

use std::path::Path;

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};

/// Dump the current configuration to stdout.
///
/// Secret references are printed as written; they are not resolved.
pub fn dump(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    let toml_str = toml::to_string_pretty(config)
        .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))?;
    println!("# config.toml ({})", config_path.display());
    println!("{}", toml_str);

    Ok(())
}

/// Validate the configuration, resolving secrets along the way.
pub fn validate(config: &ClientConfig) -> ClientResult<()> {
    let google = config.google_settings();
    let auth_config = google
        .to_auth_config()
        .map_err(|e| ClientError::Config(format!("invalid Google settings: {}", e)))?;
    println!("Google credentials are valid.");

    if google.persisted_grant(&auth_config.credentials).is_complete() {
        println!("Persisted refresh token is configured.");
    } else {
        println!("No persisted refresh token; a browser login will be needed.");
    }

    println!("Configuration is valid.");
    Ok(())
}

/// Show the configuration and session file paths.
pub fn path(config: &ClientConfig, config_path: &Path) -> ClientResult<()> {
    println!("config: {}", config_path.display());
    println!("session: {}", config.session_path().display());
    Ok(())
}
