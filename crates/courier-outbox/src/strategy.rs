//! Publish strategies.
//!
//! A strategy decides what happens inside the caller's transaction when an
//! outbox-wrapped function is called. Neither strategy invokes the business
//! callable before commit.

use crate::commit_hook::CommitHook;
use crate::{
    CallArgs, CaptureFn, Envelope, Handler, OutboxError, OutboxResult, OutboxSettings, Signals,
};
use courier_database::{queries, Transaction};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// Strategy name, as configured and as stored on each envelope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStrategyType {
    /// Attempt right after commit; failures fall back to the relayer.
    #[default]
    BestEffort,
    /// Always persist; only the relayer delivers, stopping on failure.
    KeepOrder,
}

impl PublishStrategyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PublishStrategyType::BestEffort => "best_effort",
            PublishStrategyType::KeepOrder => "keep_order",
        }
    }

    /// Whether a relay failure halts the rest of its stream.
    pub fn halts_on_failure(&self) -> bool {
        matches!(self, PublishStrategyType::KeepOrder)
    }
}

impl FromStr for PublishStrategyType {
    type Err = OutboxError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" | "performance" | "publish-on-commit" => {
                Ok(PublishStrategyType::BestEffort)
            }
            "keep-order" | "keep_order" => Ok(PublishStrategyType::KeepOrder),
            other => Err(OutboxError::Configuration(format!(
                "unknown publish strategy {other:?}, expected best-effort or keep-order"
            ))),
        }
    }
}

impl fmt::Display for PublishStrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One call of an outbox-wrapped function.
pub struct PublishRequest {
    pub target: String,
    pub handler: Handler,
    pub call: CallArgs,
    pub stream: Option<String>,
}

/// Transactional half of publishing.
pub trait PublishStrategy: Send + Sync {
    fn kind(&self) -> PublishStrategyType;

    /// Record `request` in `tx`. Called while the caller's transaction is open.
    fn publish(&self, tx: &Transaction<'_>, request: PublishRequest) -> OutboxResult<()>;
}

/// Persist optionally, then attempt delivery once after commit.
pub struct BestEffortStrategy {
    settings: OutboxSettings,
    signals: Arc<Signals>,
    capture: Option<CaptureFn>,
}

impl BestEffortStrategy {
    pub fn new(settings: OutboxSettings, signals: Arc<Signals>, capture: Option<CaptureFn>) -> Self {
        Self {
            settings,
            signals,
            capture,
        }
    }
}

impl PublishStrategy for BestEffortStrategy {
    fn kind(&self) -> PublishStrategyType {
        PublishStrategyType::BestEffort
    }

    fn publish(&self, tx: &Transaction<'_>, request: PublishRequest) -> OutboxResult<()> {
        let record = Envelope::record(
            &request.target,
            &request.call,
            request.stream.as_deref(),
            self.kind(),
        )?;

        let event_id = if self.settings.persist_all_events {
            Some(queries::insert_outbox_event(tx, &record)?.id)
        } else {
            None
        };

        debug!(
            target_key = %request.target,
            event_id,
            "Scheduled delivery after commit"
        );

        let hook = CommitHook {
            target: request.target,
            handler: request.handler,
            call: request.call,
            record,
            event_id,
            delete_after_send: self.settings.delete_after_send,
            signals: self.signals.clone(),
            capture: self.capture.clone(),
        };
        tx.on_commit(move |db| {
            hook.run(db);
        });
        Ok(())
    }
}

/// Always persist and leave delivery to the relayer.
#[derive(Debug, Default)]
pub struct KeepOrderStrategy;

impl PublishStrategy for KeepOrderStrategy {
    fn kind(&self) -> PublishStrategyType {
        PublishStrategyType::KeepOrder
    }

    fn publish(&self, tx: &Transaction<'_>, request: PublishRequest) -> OutboxResult<()> {
        let record = Envelope::record(
            &request.target,
            &request.call,
            request.stream.as_deref(),
            self.kind(),
        )?;
        let event = queries::insert_outbox_event(tx, &record)?;
        debug!(
            target_key = %request.target,
            event_id = event.id,
            stream = ?event.stream,
            "Persisted event for ordered relay"
        );
        Ok(())
    }
}

/// Build the strategy for `kind`.
pub fn create_publish_strategy(
    kind: PublishStrategyType,
    settings: &OutboxSettings,
    signals: Arc<Signals>,
    capture: Option<CaptureFn>,
) -> Arc<dyn PublishStrategy> {
    match kind {
        PublishStrategyType::BestEffort => Arc::new(BestEffortStrategy::new(
            settings.clone(),
            signals,
            capture,
        )),
        PublishStrategyType::KeepOrder => Arc::new(KeepOrderStrategy),
    }
}
