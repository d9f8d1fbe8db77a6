//! gptcalendar CLI entry point.

use std::process::ExitCode;

use clap::Parser;

use gptcalendar_cli::cli::{Cli, Command, ConfigAction};
use gptcalendar_cli::commands::{self, AuthContext};
use gptcalendar_cli::config::ClientConfig;
use gptcalendar_cli::error::{ClientError, ClientResult};
use gptcalendar_core::{TracingConfig, init_tracing};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let tracing_config = if cli.debug {
        TracingConfig::cli_debug()
    } else {
        TracingConfig::cli()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("warning: {}", e);
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> ClientResult<()> {
    let config_path = cli.config.clone().unwrap_or_else(ClientConfig::default_path);
    let config = if let Some(ref path) = cli.config {
        ClientConfig::load_from(path).map_err(ClientError::Config)?
    } else {
        ClientConfig::load().map_err(ClientError::Config)?
    };

    match cli.command {
        Command::Login { no_browser } => {
            let ctx = AuthContext::from_config(&config, &config_path)?;
            commands::auth::login(&ctx, no_browser).await
        }
        Command::Callback { url } => {
            let ctx = AuthContext::from_config(&config, &config_path)?;
            commands::auth::callback(&ctx, &url).await
        }
        Command::Resolve { json } => {
            let ctx = AuthContext::from_config(&config, &config_path)?;
            commands::resolve::resolve(&ctx, json).await
        }
        Command::Status => commands::resolve::status(&config, &config_path),
        Command::Logout => commands::auth::logout(&gptcalendar_cli::SessionStore::new(
            config.session_path(),
        )),
        Command::Config { action } => match action {
            ConfigAction::Dump => commands::config::dump(&config, &config_path),
            ConfigAction::Validate => commands::config::validate(&config),
            ConfigAction::Path => commands::config::path(&config, &config_path),
        },
    }
}
