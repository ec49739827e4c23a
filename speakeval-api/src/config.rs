//! Command-line and environment configuration.

use clap::Parser;
use speakeval::observability::{LogFormat, LoggingConfig};
use speakeval::pipeline::{ExecutionMode, ExecutorConfig};
use std::time::Duration;

/// Server settings. Every flag can also be set through its environment variable.
#[derive(Debug, Clone, Parser)]
#[command(name = "speakeval-api")]
#[command(about = "IELTS speaking feedback HTTP service")]
#[command(version)]
pub struct ServerArgs {
    /// Interface to bind.
    #[arg(long, default_value = "0.0.0.0", env = "SPEAKEVAL_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 8000, env = "PORT")]
    pub port: u16,

    /// Seconds a single assessment may take before the request gets a 504.
    #[arg(long, default_value_t = 300, env = "SPEAKEVAL_REQUEST_TIMEOUT")]
    pub request_timeout_secs: u64,

    /// Largest accepted upload, in megabytes.
    #[arg(long, default_value_t = 25, env = "SPEAKEVAL_MAX_UPLOAD_MB")]
    pub max_upload_mb: usize,

    /// Run stages one at a time instead of concurrently.
    #[arg(long, env = "SPEAKEVAL_SEQUENTIAL")]
    pub sequential: bool,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info,tower_http=debug", env = "SPEAKEVAL_LOG_LEVEL")]
    pub log_level: String,

    /// Log output format (`pretty` or `json`).
    #[arg(long, default_value = "pretty", env = "SPEAKEVAL_LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl ServerArgs {
    /// Socket address to bind, as `host:port`.
    #[must_use]
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Per-request timeout.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Upload limit in bytes.
    #[must_use]
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Logging settings.
    #[must_use]
    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig::default()
            .with_level(self.log_level.clone())
            .with_format(self.log_format)
    }

    /// Executor settings.
    #[must_use]
    pub fn executor(&self) -> ExecutorConfig {
        let mode = if self.sequential {
            ExecutionMode::Sequential
        } else {
            ExecutionMode::Concurrent
        };
        ExecutorConfig::default().with_mode(mode)
    }
}
