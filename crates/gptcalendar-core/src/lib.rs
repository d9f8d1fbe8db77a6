//! Shared plumbing for the gptcalendar crates.

pub mod tracing;

pub use self::tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
