//! Configuration management for the outbox.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default publish strategy name.
pub const DEFAULT_PUBLISH_STRATEGY: &str = "best-effort";

/// Default retention for delivered events (14 days).
pub const DEFAULT_TIME_TO_DELETE_SECS: u64 = 14 * 24 * 60 * 60;

/// Longest accepted retention (100 years).
pub const MAX_TIME_TO_DELETE_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Outbox configuration.
///
/// The publish strategy is kept as a name here. It is parsed when the outbox
/// settings are built, so an unknown name fails before anything is published.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Persist every event before the inline attempt, not only failed ones.
    #[serde(default)]
    pub persist_all_events: bool,
    /// Delete delivered events instead of stamping `sent_at`.
    #[serde(default)]
    pub delete_after_send: bool,
    /// Process-wide default publish strategy.
    #[serde(default = "default_publish_strategy")]
    pub publish_strategy: String,
    /// Age after which delivered events are removed by the cleaner.
    #[serde(default = "default_time_to_delete_secs")]
    pub time_to_delete_secs: u64,
    /// Database file override. Defaults to `Paths::database_file()`.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_publish_strategy() -> String {
    DEFAULT_PUBLISH_STRATEGY.to_string()
}

fn default_time_to_delete_secs() -> u64 {
    DEFAULT_TIME_TO_DELETE_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            persist_all_events: false,
            delete_after_send: false,
            publish_strategy: default_publish_strategy(),
            time_to_delete_secs: DEFAULT_TIME_TO_DELETE_SECS,
            database_path: None,
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> CoreResult<Self> {
        let mut config = Self::default();
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the base directory, falling back to defaults,
    /// then apply environment overrides.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    /// Override fields from `COURIER_*` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> CoreResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        if let Some(level) = lookup("COURIER_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(raw) = lookup("COURIER_PERSIST_ALL_EVENTS") {
            self.persist_all_events = parse_bool("COURIER_PERSIST_ALL_EVENTS", &raw)?;
        }
        if let Some(raw) = lookup("COURIER_DELETE_AFTER_SEND") {
            self.delete_after_send = parse_bool("COURIER_DELETE_AFTER_SEND", &raw)?;
        }
        if let Some(strategy) = lookup("COURIER_PUBLISH_STRATEGY") {
            self.publish_strategy = strategy;
        }
        if let Some(raw) = lookup("COURIER_TIME_TO_DELETE_SECS") {
            self.time_to_delete_secs = raw.parse().map_err(|_| {
                CoreError::Config(format!("COURIER_TIME_TO_DELETE_SECS is not a number: {raw}"))
            })?;
        }
        if let Some(path) = lookup("COURIER_DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }

        Ok(())
    }

    /// Reject values that cannot drive the outbox.
    pub fn validate(&self) -> CoreResult<()> {
        if self.time_to_delete_secs == 0 {
            return Err(CoreError::Config(
                "time_to_delete_secs must be greater than zero".to_string(),
            ));
        }
        if self.time_to_delete_secs > MAX_TIME_TO_DELETE_SECS {
            return Err(CoreError::Config(format!(
                "time_to_delete_secs must be at most {MAX_TIME_TO_DELETE_SECS}"
            )));
        }
        if self.publish_strategy.trim().is_empty() {
            return Err(CoreError::Config("publish_strategy must not be empty".to_string()));
        }
        Ok(())
    }

    /// Retention age for delivered events.
    pub fn time_to_delete(&self) -> Duration {
        Duration::from_secs(self.time_to_delete_secs)
    }

    /// Database file, honouring the override.
    pub fn database_file(&self, paths: &Paths) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(|| paths.database_file())
    }
}

fn parse_bool(name: &str, raw: &str) -> CoreResult<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(CoreError::Config(format!("{name} is not a boolean: {raw}"))),
    }
}
