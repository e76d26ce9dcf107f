//! Outbox settings.

use crate::{OutboxError, OutboxResult, PublishStrategyType};
use courier_config_and_utils::{Config, DEFAULT_TIME_TO_DELETE_SECS};
use std::time::Duration;

/// Settings shared by the publishing path, the relayer, and the cleaner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxSettings {
    /// Persist every event before attempting it, not only failed ones.
    pub persist_all_events: bool,
    /// Delete delivered events instead of stamping `sent_at`.
    pub delete_after_send: bool,
    /// Strategy used when a call site does not choose one.
    pub publish_strategy: PublishStrategyType,
    /// Age after which delivered events are removed.
    pub time_to_delete: Duration,
}

impl Default for OutboxSettings {
    fn default() -> Self {
        Self {
            persist_all_events: false,
            delete_after_send: false,
            publish_strategy: PublishStrategyType::default(),
            time_to_delete: Duration::from_secs(DEFAULT_TIME_TO_DELETE_SECS),
        }
    }
}

impl OutboxSettings {
    /// Build settings from loaded configuration, rejecting unknown strategies.
    pub fn from_config(config: &Config) -> OutboxResult<Self> {
        config
            .validate()
            .map_err(|e| OutboxError::Configuration(e.to_string()))?;
        Ok(Self {
            persist_all_events: config.persist_all_events,
            delete_after_send: config.delete_after_send,
            publish_strategy: config.publish_strategy.parse()?,
            time_to_delete: config.time_to_delete(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_config_defaults() {
        let settings = OutboxSettings::from_config(&Config::default()).unwrap();
        assert_eq!(settings, OutboxSettings::default());
        assert_eq!(settings.publish_strategy, PublishStrategyType::BestEffort);
        assert_eq!(settings.time_to_delete, Duration::from_secs(14 * 24 * 60 * 60));
    }

    #[test]
    fn test_from_config_copies_flags() {
        let config = Config {
            persist_all_events: true,
            delete_after_send: true,
            publish_strategy: "keep-order".to_string(),
            time_to_delete_secs: 60,
            ..Config::default()
        };

        let settings = OutboxSettings::from_config(&config).unwrap();
        assert!(settings.persist_all_events);
        assert!(settings.delete_after_send);
        assert_eq!(settings.publish_strategy, PublishStrategyType::KeepOrder);
        assert_eq!(settings.time_to_delete, Duration::from_secs(60));
    }

    #[test]
    fn test_unknown_strategy_fails_at_construction() {
        let config = Config {
            publish_strategy: "fire-and-forget".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            OutboxSettings::from_config(&config),
            Err(OutboxError::Configuration(_))
        ));
    }

    #[test]
    fn test_zero_retention_rejected() {
        let config = Config {
            time_to_delete_secs: 0,
            ..Config::default()
        };
        assert!(OutboxSettings::from_config(&config).is_err());
    }

    #[test]
    fn test_retention_beyond_limit_rejected() {
        let config = Config {
            time_to_delete_secs: courier_config_and_utils::MAX_TIME_TO_DELETE_SECS + 1,
            ..Config::default()
        };
        assert!(matches!(
            OutboxSettings::from_config(&config),
            Err(OutboxError::Configuration(_))
        ));
    }
}
