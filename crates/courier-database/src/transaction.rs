//! Write transactions with post-commit callbacks.
//!
//! A [`Transaction`] derefs to [`rusqlite::Connection`], so business writes and
//! outbox inserts issued through it commit or roll back together. Callbacks
//! registered with [`Transaction::on_commit`] run exactly once, in
//! registration order, after `COMMIT` succeeds and the connection is back in
//! autocommit mode. Rolled back or dropped transactions discard them.

use crate::{Database, DatabaseResult};
use rusqlite::Connection;
use std::cell::RefCell;
use std::ops::Deref;
use tracing::debug;

/// Callback executed after a successful commit.
pub type CommitCallback<'db> = Box<dyn FnOnce(&Database) + 'db>;

/// An open write transaction on a [`Database`].
pub struct Transaction<'db> {
    db: &'db Database,
    tx: rusqlite::Transaction<'db>,
    on_commit: RefCell<Vec<CommitCallback<'db>>>,
}

impl<'db> Transaction<'db> {
    pub(crate) fn new(db: &'db Database, tx: rusqlite::Transaction<'db>) -> Self {
        Self {
            db,
            tx,
            on_commit: RefCell::new(Vec::new()),
        }
    }

    /// Schedule `callback` to run after this transaction commits.
    pub fn on_commit<F>(&self, callback: F)
    where
        F: FnOnce(&Database) + 'db,
    {
        self.on_commit.borrow_mut().push(Box::new(callback));
    }

    /// Number of callbacks waiting for commit.
    pub fn pending_callbacks(&self) -> usize {
        self.on_commit.borrow().len()
    }

    /// Commit, then run the registered callbacks against the database.
    pub fn commit(self) -> DatabaseResult<()> {
        let Transaction { db, tx, on_commit } = self;
        tx.commit()?;

        let callbacks = on_commit.into_inner();
        if !callbacks.is_empty() {
            debug!(count = callbacks.len(), "Running on-commit callbacks");
        }
        for callback in callbacks {
            callback(db);
        }
        Ok(())
    }

    /// Roll back and discard the registered callbacks.
    pub fn rollback(self) -> DatabaseResult<()> {
        let discarded = self.on_commit.borrow().len();
        self.tx.rollback()?;
        if discarded > 0 {
            debug!(count = discarded, "Discarded on-commit callbacks after rollback");
        }
        Ok(())
    }
}

impl Deref for Transaction<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.tx
    }
}
