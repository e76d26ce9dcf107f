//! Inline delivery attempt that runs after the caller's transaction commits.

use crate::registry::invoke;
use crate::{CallArgs, CaptureFn, Handler, Notification, OutboxError, Signal, Signals};
use courier_database::{Database, NewOutboxEvent};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of an inline attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookOutcome {
    Delivered,
    /// Handed over to the relayer as the given envelope.
    Deferred { event_id: i64 },
    /// The attempt failed and the envelope could not be stored.
    Lost,
}

pub(crate) struct CommitHook {
    pub target: String,
    pub handler: Handler,
    pub call: CallArgs,
    pub record: NewOutboxEvent,
    /// Set when the envelope was already persisted in the transaction.
    pub event_id: Option<i64>,
    pub delete_after_send: bool,
    pub signals: Arc<Signals>,
    pub capture: Option<CaptureFn>,
}

impl CommitHook {
    /// Attempt delivery once. Business failures never escape.
    pub fn run(self, db: &Database) -> HookOutcome {
        match invoke(&self.handler, &self.call) {
            Ok(()) => {
                if let Some(event_id) = self.event_id {
                    self.reconcile(db, event_id);
                }
                info!(target_key = %self.target, event_id = self.event_id, "Event published");
                self.notify(Signal::EventPublished, self.event_id);
                HookOutcome::Delivered
            }
            Err(source) => {
                let failure = OutboxError::Invocation {
                    target: self.target.clone(),
                    source,
                };
                warn!(target_key = %self.target, error = %failure, "Inline publish failed, deferring to relay");

                let event_id = match self.event_id {
                    Some(id) => Some(id),
                    None => self.persist(db),
                };
                self.notify(Signal::EventFailedToPublish, event_id);
                self.report(&failure);

                match event_id {
                    Some(event_id) => HookOutcome::Deferred { event_id },
                    None => HookOutcome::Lost,
                }
            }
        }
    }

    fn reconcile(&self, db: &Database, event_id: i64) {
        let result = if self.delete_after_send {
            db.delete_outbox_event(event_id)
        } else {
            db.mark_outbox_event_sent(event_id)
        };
        if let Err(e) = result {
            let e = OutboxError::from(e);
            error!(event_id, error = %e, "Failed to record delivery");
            self.report(&e);
        }
    }

    fn persist(&self, db: &Database) -> Option<i64> {
        match db.insert_outbox_event(&self.record) {
            Ok(event) => Some(event.id),
            Err(e) => {
                let e = OutboxError::from(e);
                error!(target_key = %self.target, error = %e, "Failed to persist undelivered event");
                self.report(&e);
                None
            }
        }
    }

    fn notify(&self, signal: Signal, event_id: Option<i64>) {
        let notification = Notification::new(
            signal,
            &self.target,
            &self.call,
            event_id,
            self.record.stream.as_deref(),
        );
        self.signals.emit(&notification);
    }

    fn report(&self, error: &OutboxError) {
        if let Some(capture) = &self.capture {
            capture(error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Envelope, PublishStrategyType};
    use std::sync::Mutex;

    fn hook(handler: Handler, event_id: Option<i64>, delete_after_send: bool) -> CommitHook {
        let call = CallArgs::new().arg("order-1");
        CommitHook {
            target: "billing.charge".to_string(),
            handler,
            record: Envelope::record("billing.charge", &call, None, PublishStrategyType::BestEffort)
                .unwrap(),
            call,
            event_id,
            delete_after_send,
            signals: Arc::new(Signals::new()),
            capture: None,
        }
    }

    fn ok_handler() -> Handler {
        Arc::new(|_: &CallArgs| Ok(()))
    }

    fn failing_handler() -> Handler {
        Arc::new(|_: &CallArgs| Err("gateway timeout".into()))
    }

    #[test]
    fn test_success_without_persisted_envelope_leaves_store_empty() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(hook(ok_handler(), None, false).run(&db), HookOutcome::Delivered);
        assert_eq!(db.count_outbox_events().unwrap().total(), 0);
    }

    #[test]
    fn test_success_marks_or_deletes_persisted_envelope() {
        let db = Database::open_in_memory().unwrap();

        let h = hook(ok_handler(), None, false);
        let kept = db.insert_outbox_event(&h.record).unwrap();
        let h = CommitHook {
            event_id: Some(kept.id),
            ..h
        };
        h.run(&db);
        assert!(db.get_outbox_event(kept.id).unwrap().unwrap().is_sent());

        let h = hook(ok_handler(), None, true);
        let deleted = db.insert_outbox_event(&h.record).unwrap();
        let h = CommitHook {
            event_id: Some(deleted.id),
            ..h
        };
        h.run(&db);
        assert!(db.get_outbox_event(deleted.id).unwrap().is_none());
    }

    #[test]
    fn test_failure_persists_once_and_notifies() {
        let db = Database::open_in_memory().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::new(Mutex::new(0));

        let mut h = hook(failing_handler(), None, false);
        let log = seen.clone();
        h.signals.subscribe_all(move |n| {
            log.lock().unwrap().push((n.signal, n.event_id));
            Ok(())
        });
        let count = captured.clone();
        h.capture = Some(Arc::new(move |e: &OutboxError| {
            assert!(matches!(e, OutboxError::Invocation { .. }));
            *count.lock().unwrap() += 1;
        }));

        let outcome = h.run(&db);
        let pending = db.get_pending_outbox_events(None).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(outcome, HookOutcome::Deferred { event_id: pending[0].id });
        assert_eq!(
            *seen.lock().unwrap(),
            vec![(Signal::EventFailedToPublish, Some(pending[0].id))]
        );
        assert_eq!(*captured.lock().unwrap(), 1);
    }

    #[test]
    fn test_failure_with_persisted_envelope_does_not_duplicate() {
        let db = Database::open_in_memory().unwrap();
        let h = hook(failing_handler(), None, false);
        let stored = db.insert_outbox_event(&h.record).unwrap();
        let h = CommitHook {
            event_id: Some(stored.id),
            ..h
        };

        assert_eq!(h.run(&db), HookOutcome::Deferred { event_id: stored.id });
        assert_eq!(db.count_outbox_events().unwrap().pending, 1);
    }
}
