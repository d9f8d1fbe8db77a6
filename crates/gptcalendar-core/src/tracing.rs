//! Tracing setup for gptcalendar.
//!
//! Every binary in the workspace calls [`init_tracing`] once at startup.
//! `RUST_LOG` always wins over the configured level.
//!
//! ```ignore
//! use gptcalendar_core::{init_tracing, TracingConfig};
//!
//! let config = if debug { TracingConfig::cli_debug() } else { TracingConfig::cli() };
//! init_tracing(config)?;
//! ```

use thiserror::Error;
use tracing::{Level, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, fmt, prelude::*};

/// Target prefix shared by every crate in the workspace.
const TARGET_PREFIX: &str = "gptcalendar";

/// Errors that can occur during tracing initialization
#[derive(Debug, Error)]
pub enum TracingError {
    /// Failed to set global subscriber
    #[error("failed to set global tracing subscriber: {0}")]
    SetGlobalSubscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    /// Failed to parse env filter directive
    #[error("failed to parse env filter: {0}")]
    EnvFilter(#[from] tracing_subscriber::filter::ParseError),
}

/// Output format for tracing logs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Human-readable multi-line format
    Pretty,
    /// Compact single-line format (default)
    #[default]
    Compact,
    /// JSON lines, for log shippers
    Json,
}

/// Configuration for tracing initialization
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level applied to gptcalendar targets when `RUST_LOG` is not set
    pub default_level: Level,
    /// Output format for log messages
    pub output_format: TracingOutputFormat,
    /// Whether to include file/line information
    pub include_location: bool,
    /// Whether to include the module path
    pub include_target: bool,
    /// Whether to include timestamps
    pub include_timestamp: bool,
    /// Explicit filter directive, overrides `default_level`
    pub env_filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            output_format: TracingOutputFormat::Compact,
            include_location: false,
            include_target: true,
            include_timestamp: true,
            env_filter: None,
        }
    }
}

impl TracingConfig {
    /// Quiet preset for interactive CLI use: warnings and errors only.
    #[must_use]
    pub fn cli() -> Self {
        Self {
            default_level: Level::WARN,
            include_target: false,
            include_timestamp: false,
            ..Self::default()
        }
    }

    /// Verbose CLI preset used by `--debug`.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            default_level: Level::DEBUG,
            include_location: true,
            include_timestamp: false,
            ..Self::default()
        }
    }

    /// Structured preset for running under a supervisor.
    #[must_use]
    pub fn json() -> Self {
        Self {
            output_format: TracingOutputFormat::Json,
            include_location: true,
            ..Self::default()
        }
    }

    /// Set the default log level
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set the output format
    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.output_format = format;
        self
    }

    /// Set a custom env filter directive
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.env_filter = Some(filter.into());
        self
    }

    /// The filter directive used when `RUST_LOG` is unset.
    pub fn default_directive(&self) -> String {
        match self.env_filter {
            Some(ref filter) => filter.clone(),
            None => format!(
                "{}={}",
                TARGET_PREFIX,
                self.default_level.to_string().to_lowercase()
            ),
        }
    }

    fn build_filter(&self) -> Result<EnvFilter, TracingError> {
        if self.env_filter.is_some() {
            return Ok(EnvFilter::try_new(self.default_directive())?);
        }
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => Ok(EnvFilter::try_new(self.default_directive())?),
        }
    }
}

/// Initialize the global subscriber.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed or the
/// filter directive does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.build_filter()?;
    let layer = fmt_layer(&config, std::io::stderr);

    let subscriber = tracing_subscriber::registry().with(filter).with(layer);
    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Builds the formatting layer for `config`, writing to `writer`.
fn fmt_layer<S, W>(config: &TracingConfig, writer: W) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    macro_rules! finish {
        ($layer:expr) => {{
            let layer = $layer
                .with_writer(writer)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_target(config.include_target);
            if config.include_timestamp {
                layer.boxed()
            } else {
                layer.without_time().boxed()
            }
        }};
    }

    match config.output_format {
        TracingOutputFormat::Pretty => finish!(fmt::layer().pretty()),
        TracingOutputFormat::Compact => finish!(fmt::layer().compact()),
        TracingOutputFormat::Json => finish!(fmt::layer().json()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn default_config() {
        let config = TracingConfig::default();
        assert_eq!(config.default_level, Level::INFO);
        assert_eq!(config.output_format, TracingOutputFormat::Compact);
        assert!(!config.include_location);
        assert!(config.env_filter.is_none());
    }

    #[test]
    fn cli_presets() {
        let quiet = TracingConfig::cli();
        assert_eq!(quiet.default_level, Level::WARN);
        assert!(!quiet.include_timestamp);

        let debug = TracingConfig::cli_debug();
        assert_eq!(debug.default_level, Level::DEBUG);
        assert!(debug.include_location);
    }

    #[test]
    fn json_preset() {
        let config = TracingConfig::json();
        assert_eq!(config.output_format, TracingOutputFormat::Json);
        assert!(config.include_timestamp);
    }

    #[test]
    fn default_directive_uses_workspace_prefix() {
        assert_eq!(TracingConfig::cli().default_directive(), "gptcalendar=warn");
        assert_eq!(
            TracingConfig::cli_debug().default_directive(),
            "gptcalendar=debug"
        );
    }

    #[test]
    fn explicit_filter_wins() {
        let config = TracingConfig::default()
            .with_level(Level::ERROR)
            .with_env_filter("gptcalendar_auth=trace");
        assert_eq!(config.default_directive(), "gptcalendar_auth=trace");
        assert!(config.build_filter().is_ok());
    }

    #[test]
    fn invalid_filter_is_reported() {
        let config = TracingConfig::default().with_env_filter("gptcalendar=notalevel");
        assert!(matches!(
            config.build_filter(),
            Err(TracingError::EnvFilter(_))
        ));
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn render(config: TracingConfig) -> String {
        let captured = Captured::default();
        let writer = captured.clone();
        let layer = fmt_layer(&config, move || writer.clone());
        let subscriber = tracing_subscriber::registry().with(layer);
        tracing::subscriber::with_default(subscriber, || tracing::info!("hello"));
        captured.text()
    }

    #[test]
    fn timestamp_setting_applies_to_every_format() {
        for format in [
            TracingOutputFormat::Pretty,
            TracingOutputFormat::Compact,
            TracingOutputFormat::Json,
        ] {
            let mut config = TracingConfig::default().with_format(format);
            config.include_target = false;

            let with_time = render(config.clone());
            assert!(with_time.contains("hello"), "{:?}: {}", format, with_time);
            assert!(with_time.contains(':'), "{:?}: {}", format, with_time);

            config.include_timestamp = false;
            let without_time = render(config);
            assert!(without_time.contains("hello"), "{:?}: {}", format, without_time);
            if format == TracingOutputFormat::Json {
                assert!(!without_time.contains("\"timestamp\""), "{}", without_time);
            } else {
                assert!(!without_time.contains(':'), "{:?}: {}", format, without_time);
            }
        }
    }
}
