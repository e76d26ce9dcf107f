//! Stored form of a deferred call.

use crate::{CallArgs, OutboxError, OutboxResult, PublishStrategyType, Value};
use chrono::{DateTime, Utc};
use courier_database::{NewOutboxEvent, OutboxEvent};
use tracing::warn;

/// A decoded outbox row.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    pub id: i64,
    /// Dotted target path of the business callable.
    pub target: String,
    pub call: CallArgs,
    /// Ordering partition. `None` is the default partition.
    pub stream: Option<String>,
    /// Strategy in force when the call was published. `None` for legacy rows.
    pub strategy: Option<PublishStrategyType>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl Envelope {
    /// Build the row for a new envelope.
    pub fn record(
        target: &str,
        call: &CallArgs,
        stream: Option<&str>,
        strategy: PublishStrategyType,
    ) -> OutboxResult<NewOutboxEvent> {
        let (message, kwargs) = call.encode()?;
        Ok(NewOutboxEvent {
            function: target.to_string(),
            message,
            kwargs,
            stream: normalize_stream(stream),
            strategy: Some(strategy.as_str().to_string()),
        })
    }

    /// Decode a stored row. Failures are terminal for that row.
    pub fn decode(event: &OutboxEvent) -> OutboxResult<Self> {
        Self::decode_with_strategy(event, stored_strategy(event))
    }

    /// Decode a row whose strategy column has already been parsed.
    pub(crate) fn decode_with_strategy(
        event: &OutboxEvent,
        strategy: Option<PublishStrategyType>,
    ) -> OutboxResult<Self> {
        let call = CallArgs::decode(&event.message, event.kwargs.as_deref()).map_err(|e| {
            OutboxError::CorruptEnvelope {
                id: event.id,
                reason: e.to_string(),
            }
        })?;

        Ok(Self {
            id: event.id,
            target: event.function.clone(),
            call,
            stream: normalize_stream(event.stream.as_deref()),
            strategy,
            created_at: event.created_at,
            sent_at: event.sent_at,
        })
    }

    /// Strategy to apply on replay, falling back to `default` for legacy rows.
    pub fn effective_strategy(&self, default: PublishStrategyType) -> PublishStrategyType {
        self.strategy.unwrap_or(default)
    }

    pub fn payload(&self) -> Value {
        self.call.event_payload()
    }

    pub fn is_sent(&self) -> bool {
        self.sent_at.is_some()
    }
}

/// Parse the strategy column. Unknown names are logged and read as `None`,
/// so the row falls back to the default like a legacy row.
pub(crate) fn stored_strategy(event: &OutboxEvent) -> Option<PublishStrategyType> {
    let name = event.strategy.as_deref()?;
    match name.parse::<PublishStrategyType>() {
        Ok(strategy) => Some(strategy),
        Err(e) => {
            warn!(event_id = event.id, strategy = name, error = %e, "Unknown stored strategy, using default");
            None
        }
    }
}

/// Treat a blank stream name as the default partition.
pub fn normalize_stream(stream: Option<&str>) -> Option<String> {
    stream
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
