//! Retention of delivered envelopes.

use crate::{OutboxError, OutboxResult, OutboxSettings};
use chrono::{DateTime, Utc};
use courier_database::Database;
use std::time::Duration;
use tracing::info;

/// Deletes delivered envelopes older than the retention window.
/// Pending envelopes are never touched.
#[derive(Debug, Clone)]
pub struct EventCleaner {
    time_to_delete: Duration,
}

impl EventCleaner {
    pub fn new(settings: &OutboxSettings) -> Self {
        Self {
            time_to_delete: settings.time_to_delete,
        }
    }

    pub fn time_to_delete(&self) -> Duration {
        self.time_to_delete
    }

    /// Delete envelopes sent before `now - time_to_delete`. Returns how many.
    pub fn clean(&self, db: &Database) -> OutboxResult<usize> {
        self.clean_at(db, Utc::now())
    }

    pub fn clean_at(&self, db: &Database, now: DateTime<Utc>) -> OutboxResult<usize> {
        let retention = chrono::Duration::from_std(self.time_to_delete)
            .map_err(|e| OutboxError::Configuration(format!("retention out of range: {e}")))?;
        let threshold = now.checked_sub_signed(retention).ok_or_else(|| {
            OutboxError::Configuration(format!(
                "retention of {}s reaches before the earliest representable time",
                self.time_to_delete.as_secs()
            ))
        })?;

        let deleted = db.delete_outbox_events_sent_before(threshold)?;
        if deleted == 0 {
            info!(threshold = %threshold, "No outbox events to delete");
        } else {
            info!(deleted, threshold = %threshold, "Deleted old outbox events");
        }
        Ok(deleted)
    }
}
