//! Logging initialization.
//!
//! Thin wrapper over the observability crate. Output format is chosen with
//! `COURIER_LOG_FORMAT` (`compact` or `json`) and the JSONL file location with
//! `COURIER_LOG_PATH`.

use observability::{LogConfig, LogFormat};
use std::path::PathBuf;

/// Initialize logging for the `courier` service.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("relayer started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service("courier", level);
}

/// Initialize logging with a custom service name.
pub fn init_logging_for_service(service_name: &str, level: &str) {
    let format = std::env::var("COURIER_LOG_FORMAT")
        .ok()
        .and_then(non_empty_env)
        .map(|raw| LogFormat::from_str(&raw))
        .unwrap_or_default();

    let log_path = std::env::var("COURIER_LOG_PATH")
        .ok()
        .and_then(non_empty_env)
        .map(PathBuf::from);

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).to_string().to_lowercase(),
        format,
        log_path,
        also_stderr: true,
    });
}

fn non_empty_env(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
