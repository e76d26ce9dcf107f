//! Standalone query functions that work with any Connection.
//!
//! Each function takes a `&Connection` as its first parameter, so the same
//! helpers serve autocommit use through [`crate::Database`] and writes that
//! must land inside a caller's [`crate::Transaction`].

use crate::{DatabaseError, DatabaseResult, NewOutboxEvent, OutboxCounts, OutboxEvent};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

const OUTBOX_EVENT_COLUMNS: &str =
    "id, function, message, kwargs, stream, strategy, created_at, sent_at";

/// Insert a new outbox event, stamping `created_at` with the current time.
pub fn insert_outbox_event(conn: &Connection, event: &NewOutboxEvent) -> DatabaseResult<OutboxEvent> {
    let created_at = format_datetime(Utc::now());
    conn.execute(
        "INSERT INTO outbox_events (function, message, kwargs, stream, strategy, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            event.function,
            event.message,
            event.kwargs,
            event.stream,
            event.strategy,
            created_at,
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!(event_id = id, function = %event.function, "Inserted outbox event");

    get_outbox_event(conn, id)?
        .ok_or_else(|| DatabaseError::NotFound("Outbox event not found after insert".to_string()))
}

/// Get an outbox event by ID.
pub fn get_outbox_event(conn: &Connection, id: i64) -> DatabaseResult<Option<OutboxEvent>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {OUTBOX_EVENT_COLUMNS} FROM outbox_events WHERE id = ?1"
    ))?;

    Ok(stmt.query_row(params![id], row_to_outbox_event).optional()?)
}

/// Get pending (unsent) events in creation order.
///
/// `None` selects every stream, including the default partition.
/// `Some(stream)` selects only that stream.
pub fn get_pending_outbox_events(
    conn: &Connection,
    stream: Option<&str>,
) -> DatabaseResult<Vec<OutboxEvent>> {
    let events = match stream {
        None => {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {OUTBOX_EVENT_COLUMNS} FROM outbox_events
                 WHERE sent_at IS NULL
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map([], row_to_outbox_event)?;
            let events = rows.collect::<Result<Vec<_>, _>>()?;
            events
        }
        Some(stream) => {
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT {OUTBOX_EVENT_COLUMNS} FROM outbox_events
                 WHERE sent_at IS NULL AND stream = ?1
                 ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![stream], row_to_outbox_event)?;
            let events = rows.collect::<Result<Vec<_>, _>>()?;
            events
        }
    };

    Ok(events)
}

/// List events regardless of state, oldest first.
pub fn list_outbox_events(conn: &Connection, limit: usize) -> DatabaseResult<Vec<OutboxEvent>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {OUTBOX_EVENT_COLUMNS} FROM outbox_events
         ORDER BY created_at ASC, id ASC
         LIMIT ?1"
    ))?;
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let events = stmt
        .query_map(params![limit], row_to_outbox_event)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(events)
}

/// Stamp `sent_at` on a pending event.
///
/// Returns false when the event does not exist or was already sent; an
/// existing `sent_at` is never overwritten.
pub fn mark_outbox_event_sent(
    conn: &Connection,
    id: i64,
    sent_at: DateTime<Utc>,
) -> DatabaseResult<bool> {
    let count = conn.execute(
        "UPDATE outbox_events SET sent_at = ?1 WHERE id = ?2 AND sent_at IS NULL",
        params![format_datetime(sent_at), id],
    )?;
    Ok(count > 0)
}

/// Delete an outbox event by ID.
pub fn delete_outbox_event(conn: &Connection, id: i64) -> DatabaseResult<bool> {
    let count = conn.execute("DELETE FROM outbox_events WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Delete delivered events whose `sent_at` is strictly older than `threshold`.
///
/// Pending events are never touched.
pub fn delete_outbox_events_sent_before(
    conn: &Connection,
    threshold: DateTime<Utc>,
) -> DatabaseResult<usize> {
    let count = conn.execute(
        "DELETE FROM outbox_events WHERE sent_at IS NOT NULL AND sent_at < ?1",
        params![format_datetime(threshold)],
    )?;
    Ok(count)
}

/// Count pending and delivered events.
pub fn count_outbox_events(conn: &Connection) -> DatabaseResult<OutboxCounts> {
    let (pending, sent): (i64, i64) = conn.query_row(
        "SELECT
            COALESCE(SUM(CASE WHEN sent_at IS NULL THEN 1 ELSE 0 END), 0),
            COALESCE(SUM(CASE WHEN sent_at IS NOT NULL THEN 1 ELSE 0 END), 0)
         FROM outbox_events",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?;

    Ok(OutboxCounts {
        pending: pending.max(0) as u64,
        sent: sent.max(0) as u64,
    })
}

/// Fixed-width RFC 3339 so that text ordering matches time ordering.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(idx: usize, raw: String) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn row_to_outbox_event(row: &Row<'_>) -> rusqlite::Result<OutboxEvent> {
    let sent_at = match row.get::<_, Option<String>>(7)? {
        Some(raw) => Some(parse_datetime(7, raw)?),
        None => None,
    };

    Ok(OutboxEvent {
        id: row.get(0)?,
        function: row.get(1)?,
        message: row.get(2)?,
        kwargs: row.get(3)?,
        stream: row.get(4)?,
        strategy: row.get(5)?,
        created_at: parse_datetime(6, row.get(6)?)?,
        sent_at,
    })
}
