//! Replay of persisted envelopes.
//!
//! A sweep reads pending envelopes in creation order and invokes each one's
//! original callable. When an envelope's effective strategy is
//! [`KeepOrder`](PublishStrategyType::KeepOrder), a failure halts its stream:
//! later envelopes of that stream stay untouched until the next sweep, while
//! other streams carry on. Under best-effort the sweep continues past failures.

use crate::envelope::{normalize_stream, stored_strategy};
use crate::registry::invoke;
use crate::{
    CaptureFn, Envelope, HandlerRegistry, Notification, OutboxError, OutboxResult,
    OutboxSettings, PublishStrategyType, Signal, Signals,
};
use courier_database::{Database, OutboxEvent};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The envelope that halted its stream during a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckStream {
    /// `None` is the default partition.
    pub stream: Option<String>,
    pub event_id: i64,
}

/// Outcome of one relay sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayReport {
    /// Envelopes whose delivery was attempted.
    pub attempted: usize,
    pub delivered: Vec<i64>,
    pub failed: Vec<i64>,
    /// Envelopes left untouched because their stream was halted.
    pub skipped: usize,
    /// One entry per halted stream, in the order they halted.
    pub stuck: Vec<StuckStream>,
}

impl RelayReport {
    pub fn is_stuck(&self) -> bool {
        !self.stuck.is_empty()
    }

    /// The envelope holding `stream` back, if that stream halted.
    pub fn stuck_on(&self, stream: Option<&str>) -> Option<&StuckStream> {
        self.stuck.iter().find(|s| s.stream.as_deref() == stream)
    }

    pub fn is_idle(&self) -> bool {
        self.attempted == 0 && self.skipped == 0
    }
}

enum Attempt {
    Delivered,
    Failed,
}

/// Replays pending envelopes.
pub struct EventRelayer {
    settings: OutboxSettings,
    registry: Arc<HandlerRegistry>,
    signals: Arc<Signals>,
    capture: Option<CaptureFn>,
}

impl EventRelayer {
    pub fn new(
        settings: OutboxSettings,
        registry: Arc<HandlerRegistry>,
        signals: Arc<Signals>,
        capture: Option<CaptureFn>,
    ) -> Self {
        Self {
            settings,
            registry,
            signals,
            capture,
        }
    }

    /// Run one sweep. `None` sweeps every stream; `Some` only the named one.
    ///
    /// Store errors abort the sweep and are returned. Business failures are
    /// recorded in the report.
    pub fn relay(&self, db: &Database, stream: Option<&str>) -> OutboxResult<RelayReport> {
        let events = db.get_pending_outbox_events(stream)?;
        let mut report = RelayReport::default();

        if events.is_empty() {
            info!(stream, "No pending events found");
            return Ok(report);
        }
        info!(count = events.len(), stream, "Relaying pending events");

        let mut halted: HashSet<Option<String>> = HashSet::new();

        for event in &events {
            let stream_key = normalize_stream(event.stream.as_deref());
            if halted.contains(&stream_key) {
                report.skipped += 1;
                continue;
            }

            report.attempted += 1;
            let (attempt, strategy) = self.relay_event(db, event)?;
            match attempt {
                Attempt::Delivered => report.delivered.push(event.id),
                Attempt::Failed => {
                    report.failed.push(event.id);
                    if strategy.halts_on_failure() {
                        warn!(
                            event_id = event.id,
                            stream = ?stream_key,
                            "Events relaying are stuck"
                        );
                        report.stuck.push(StuckStream {
                            stream: stream_key.clone(),
                            event_id: event.id,
                        });
                        halted.insert(stream_key);
                    }
                }
            }
        }

        info!(
            attempted = report.attempted,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            skipped = report.skipped,
            halted = report.stuck.len(),
            "Relay sweep finished"
        );
        Ok(report)
    }

    fn relay_event(
        &self,
        db: &Database,
        event: &OutboxEvent,
    ) -> OutboxResult<(Attempt, PublishStrategyType)> {
        let stored = stored_strategy(event);
        let strategy = stored.unwrap_or(self.settings.publish_strategy);

        let function = match self.registry.resolve(&event.function) {
            Ok(function) => function,
            Err(e) => {
                error!(
                    event_id = event.id,
                    target_key = %event.function,
                    error = %e,
                    "Cannot resolve event target"
                );
                self.report(&OutboxError::from(e));
                return Ok((Attempt::Failed, strategy));
            }
        };

        let envelope = match Envelope::decode_with_strategy(event, stored) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(event_id = event.id, error = %e, "Cannot decode event");
                self.report(&e);
                return Ok((Attempt::Failed, strategy));
            }
        };

        if let Err(e) = self.registry.resolve_types(&envelope.call) {
            error!(event_id = event.id, error = %e, "Cannot resolve type argument");
            self.report(&OutboxError::from(e));
            return Ok((Attempt::Failed, strategy));
        }

        match invoke(function.original(), &envelope.call) {
            Ok(()) => {
                if self.settings.delete_after_send {
                    db.delete_outbox_event(envelope.id)?;
                } else {
                    db.mark_outbox_event_sent(envelope.id)?;
                }
                debug!(event_id = envelope.id, target_key = %envelope.target, "Event relayed");
                self.notify(Signal::EventPublishedByRelay, &envelope);
                Ok((Attempt::Delivered, strategy))
            }
            Err(source) => {
                let failure = OutboxError::Invocation {
                    target: envelope.target.clone(),
                    source,
                };
                warn!(event_id = envelope.id, error = %failure, "Exception raised while relaying event");
                self.notify(Signal::EventFailedToPublishByRelay, &envelope);
                self.report(&failure);
                Ok((Attempt::Failed, strategy))
            }
        }
    }

    fn notify(&self, signal: Signal, envelope: &Envelope) {
        let notification = Notification::new(
            signal,
            &envelope.target,
            &envelope.call,
            Some(envelope.id),
            envelope.stream.as_deref(),
        );
        self.signals.emit(&notification);
    }

    fn report(&self, error: &OutboxError) {
        if let Some(capture) = &self.capture {
            capture(error);
        }
    }
}
