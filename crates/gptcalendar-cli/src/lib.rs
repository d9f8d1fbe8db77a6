//! Operator CLI for the gptcalendar credential resolver.
//!
//! This crate provides the `gptcalendar` command-line interface: browser
//! login, callback completion, credential resolution and session upkeep.

pub mod callback;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod secret;
pub mod session_file;
pub mod sink;

pub use cli::Cli;
pub use error::{ClientError, ClientResult};
pub use session_file::SessionStore;
