//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// gptcalendar - Google Calendar credentials for the calendar assistant
#[derive(Debug, Parser)]
#[command(name = "gptcalendar")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, env = "GPTCALENDAR_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v')]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start a browser login and store the result in the session
    Login {
        /// Print the authorization URL instead of opening a browser
        #[arg(long)]
        no_browser: bool,
    },

    /// Complete a pending login with the URL the browser was redirected to
    Callback {
        /// Full callback URL, including the query string
        url: String,
    },

    /// Produce a usable access token, refreshing as needed
    Resolve {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show configured credential sources and session state
    Status,

    /// Forget the stored session
    Logout,

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Print the current configuration
    Dump,
    /// Validate the configuration
    Validate,
    /// Show the configuration file path
    Path,
}
