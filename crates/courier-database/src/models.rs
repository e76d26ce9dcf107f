//! Database model types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Outbox event record - one persisted deferred call.
///
/// `function`, `message` and `kwargs` hold the serialized target, positional
/// arguments and keyword arguments exactly as written. They are decoded by
/// the outbox crate, never here, so an undecodable row can still be listed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub id: i64,
    pub function: String,
    pub message: String,
    pub kwargs: Option<String>,
    pub stream: Option<String>,
    pub strategy: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Whether the event has been delivered.
    pub fn is_sent(&self) -> bool {
        self.sent_at.is_some()
    }
}

/// New outbox event for insertion.
///
/// `created_at` is assigned by the insert itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewOutboxEvent {
    pub function: String,
    pub message: String,
    pub kwargs: Option<String>,
    pub stream: Option<String>,
    pub strategy: Option<String>,
}

/// Pending and delivered row counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutboxCounts {
    pub pending: u64,
    pub sent: u64,
}

impl OutboxCounts {
    pub fn total(&self) -> u64 {
        self.pending + self.sent
    }
}
