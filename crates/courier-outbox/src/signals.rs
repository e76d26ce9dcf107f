//! Delivery notifications.
//!
//! Subscribers are called synchronously in subscription order. A subscriber
//! that returns an error or panics is logged and skipped; it never affects
//! delivery or the remaining subscribers.

use crate::{CallArgs, Value};
use parking_lot::RwLock;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Kinds of delivery notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    /// Inline attempt after commit succeeded.
    EventPublished,
    /// Inline attempt after commit failed; the envelope was kept.
    EventFailedToPublish,
    /// Relayer replay succeeded.
    EventPublishedByRelay,
    /// Relayer replay failed.
    EventFailedToPublishByRelay,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::EventPublished => "event_published",
            Signal::EventFailedToPublish => "event_failed_to_publish",
            Signal::EventPublishedByRelay => "event_published_by_relay",
            Signal::EventFailedToPublishByRelay => "event_failed_to_publish_by_relay",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Signal::EventFailedToPublish | Signal::EventFailedToPublishByRelay
        )
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload delivered to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub signal: Signal,
    /// Dotted target path of the business callable.
    pub target: String,
    /// The event itself: first positional argument or an empty object.
    pub payload: Value,
    /// Full call context.
    pub call: CallArgs,
    /// Stored envelope, when one exists.
    pub event_id: Option<i64>,
    pub stream: Option<String>,
}

impl Notification {
    pub(crate) fn new(
        signal: Signal,
        target: &str,
        call: &CallArgs,
        event_id: Option<i64>,
        stream: Option<&str>,
    ) -> Self {
        Self {
            signal,
            target: target.to_string(),
            payload: call.event_payload(),
            call: call.clone(),
            event_id,
            stream: stream.map(str::to_string),
        }
    }
}

/// Error returned by a subscriber.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

type Subscriber = Arc<dyn Fn(&Notification) -> Result<(), SubscriberError> + Send + Sync>;

/// Ordered list of notification subscribers.
#[derive(Default)]
pub struct Signals {
    subscribers: RwLock<Vec<(Option<Signal>, Subscriber)>>,
}

impl Signals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to one kind of notification.
    pub fn subscribe<F>(&self, signal: Signal, subscriber: F)
    where
        F: Fn(&Notification) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribers
            .write()
            .push((Some(signal), Arc::new(subscriber)));
    }

    /// Subscribe to every notification.
    pub fn subscribe_all<F>(&self, subscriber: F)
    where
        F: Fn(&Notification) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.subscribers.write().push((None, Arc::new(subscriber)));
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Deliver `notification` to matching subscribers. Returns how many
    /// completed without error.
    ///
    /// Subscribers run against a snapshot taken before the first call, so a
    /// subscriber may itself subscribe; the new one sees the next emit.
    pub fn emit(&self, notification: &Notification) -> usize {
        let subscribers: Vec<_> = self.subscribers.read().clone();
        let mut delivered = 0;

        for (index, (filter, subscriber)) in subscribers.iter().enumerate() {
            if filter.is_some_and(|signal| signal != notification.signal) {
                continue;
            }
            match panic::catch_unwind(AssertUnwindSafe(|| subscriber(notification))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => warn!(
                    signal = %notification.signal,
                    subscriber = index,
                    error = %e,
                    "Signal subscriber failed"
                ),
                Err(_) => warn!(
                    signal = %notification.signal,
                    subscriber = index,
                    "Signal subscriber panicked"
                ),
            }
        }

        delivered
    }
}
