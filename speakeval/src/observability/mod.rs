//! Logging setup and timing helpers.
//!
//! Stages and the executor log through `tracing`; binaries call
//! [`init_tracing`] once at startup to install a subscriber.

mod tracing;

pub use self::tracing::{init_tracing, LogFormat, LoggingConfig, SpanTimer};
