//! Database connection and query operations.

use crate::{
    migrations, queries, DatabaseError, DatabaseResult, NewOutboxEvent, OutboxCounts,
    OutboxEvent, Transaction,
};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use std::path::Path;
use tracing::{info, warn};

/// Database wrapper with query methods.
///
/// Methods on `Database` run in autocommit mode. Writes that must be atomic
/// with business data go through [`Database::begin`] or [`Database::atomic`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the given path, running migrations if needed.
    pub fn open(path: &Path) -> DatabaseResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA busy_timeout = 5000;
        ",
        )?;

        migrations::run_migrations(&conn)?;
        info!(path = %path.display(), "Database opened");

        Ok(Self { conn })
    }

    /// Open an in-memory database for testing.
    pub fn open_in_memory() -> DatabaseResult<Self> {
        let conn = Connection::open_in_memory()?;
        // WAL mode doesn't apply to in-memory databases
        conn.execute_batch(
            "
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Get a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    // ==========================================
    // Transactions
    // ==========================================

    /// Begin a write transaction.
    pub fn begin(&self) -> DatabaseResult<Transaction<'_>> {
        let tx = self.conn.unchecked_transaction()?;
        Ok(Transaction::new(self, tx))
    }

    /// Run `f` inside a transaction.
    ///
    /// Commits when `f` returns `Ok` (running on-commit callbacks), rolls back
    /// when it returns `Err`.
    pub fn atomic<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, E>,
        E: From<DatabaseError>,
    {
        let tx = self.begin()?;
        match f(&tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback() {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    // ==========================================
    // Outbox Events
    // ==========================================

    /// Insert an outbox event outside of any caller transaction.
    pub fn insert_outbox_event(&self, event: &NewOutboxEvent) -> DatabaseResult<OutboxEvent> {
        queries::insert_outbox_event(&self.conn, event)
    }

    /// Get an outbox event by ID.
    pub fn get_outbox_event(&self, id: i64) -> DatabaseResult<Option<OutboxEvent>> {
        queries::get_outbox_event(&self.conn, id)
    }

    /// Get pending events in creation order, optionally for one stream.
    pub fn get_pending_outbox_events(&self, stream: Option<&str>) -> DatabaseResult<Vec<OutboxEvent>> {
        queries::get_pending_outbox_events(&self.conn, stream)
    }

    /// List events regardless of state.
    pub fn list_outbox_events(&self, limit: usize) -> DatabaseResult<Vec<OutboxEvent>> {
        queries::list_outbox_events(&self.conn, limit)
    }

    /// Stamp `sent_at` with the current time.
    pub fn mark_outbox_event_sent(&self, id: i64) -> DatabaseResult<bool> {
        queries::mark_outbox_event_sent(&self.conn, id, Utc::now())
    }

    /// Delete an outbox event by ID.
    pub fn delete_outbox_event(&self, id: i64) -> DatabaseResult<bool> {
        queries::delete_outbox_event(&self.conn, id)
    }

    /// Delete delivered events sent before `threshold`.
    pub fn delete_outbox_events_sent_before(&self, threshold: DateTime<Utc>) -> DatabaseResult<usize> {
        queries::delete_outbox_events_sent_before(&self.conn, threshold)
    }

    /// Count pending and delivered events.
    pub fn count_outbox_events(&self) -> DatabaseResult<OutboxCounts> {
        queries::count_outbox_events(&self.conn)
    }
}
