//! SQLite storage for the outbox.
//!
//! This crate provides:
//! - `Database`: a single rusqlite connection with WAL mode and migrations
//! - `Transaction`: a write transaction that runs registered callbacks once,
//!   right after a successful commit
//! - Model types for the `outbox_events` table
//! - Query helpers that work against any `&Connection`, including an open
//!   transaction
//!
//! ```ignore
//! let db = Database::open(path)?;
//! db.atomic(|tx| {
//!     tx.execute("INSERT INTO orders (id) VALUES (?1)", [42])?;
//!     tx.on_commit(|db| tracing::info!(pending = ?db.count_outbox_events(), "committed"));
//!     Ok::<_, DatabaseError>(())
//! })?;
//! ```

mod db;
mod error;
mod migrations;
mod models;
pub mod queries;
mod transaction;

pub use db::Database;
pub use error::{DatabaseError, DatabaseResult};
pub use migrations::{run_migrations, CURRENT_VERSION};
pub use models::*;
pub use transaction::{CommitCallback, Transaction};
