//! # Observability
//!
//! Tracing bootstrap for the Courier crates.
//!
//! Library crates never install a subscriber. They use the standard
//! `tracing` macros and leave the choice of sink to the process that embeds
//! them. Binaries call [`init`] or [`init_with_config`] once at startup.
//!
//! Two output modes are supported:
//!
//! - **Compact**: human readable lines on stderr (the default).
//! - **Jsonl**: one JSON object per line, appended to a log file
//!   (`~/.courier/logs/courier.jsonl` unless overridden). Stderr output can be
//!   kept alongside it with `also_stderr`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! fn main() {
//!     observability::init("courier");
//!     tracing::info!("relayer started");
//! }
//! ```

mod file;

use std::path::PathBuf;

pub use file::{jsonl_layer, LogFile, LogLine};

/// Output format for installed subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Compact human readable lines on stderr.
    #[default]
    Compact,
    /// Structured JSONL appended to a file.
    Jsonl,
}

impl LogFormat {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "json" | "jsonl" => Self::Jsonl,
            _ => Self::Compact,
        }
    }
}

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name of the service, logged once when the subscriber is installed.
    pub service_name: String,

    /// Default log level filter (e.g., "debug", "info", "warn").
    /// Can be overridden by `RUST_LOG` environment variable.
    pub default_level: String,

    /// Output format.
    pub format: LogFormat,

    /// Optional custom log file path for [`LogFormat::Jsonl`].
    /// Defaults to `~/.courier/logs/courier.jsonl`.
    pub log_path: Option<PathBuf>,

    /// Also emit compact logs to stderr when writing JSONL.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            format: LogFormat::Compact,
            log_path: None,
            also_stderr: false,
        }
    }
}

/// Initialize the observability layer with default settings.
pub fn init(service_name: &str) {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    });
}

/// Initialize the observability layer with custom configuration.
///
/// Installing a second global subscriber is a no-op, so calling this from
/// several entry points in the same process is harmless. If the JSONL file
/// cannot be opened, compact stderr output is installed instead.
pub fn init_with_config(config: LogConfig) {
    match config.format {
        LogFormat::Jsonl => file::init_file_subscriber(&config),
        LogFormat::Compact => init_compact(&config.default_level),
    }
}

fn init_compact(default_level: &str) {
    use tracing_subscriber::util::SubscriberInitExt;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_level))
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact()
        .finish()
        .try_init();
}

fn env_filter(default_level: &str) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level))
}

/// Re-export tracing macros for convenience.
pub use tracing::{debug, error, info, instrument, trace, warn};

/// Re-export Level for advanced filtering.
pub use tracing::Level;
