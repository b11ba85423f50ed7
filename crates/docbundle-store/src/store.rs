// ABOUTME: The BundleStore handle: one SQLite connection with foreign keys and WAL enabled.
// ABOUTME: Every write runs in a BEGIN IMMEDIATE transaction so racing writers serialize.

use std::path::Path;
use std::time::Duration;

use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::error::StoreError;
use crate::schema;

/// Tunables for opening a store.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// How long a writer waits on another connection's lock before failing.
    pub busy_timeout: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_millis(5000),
        }
    }
}

/// A SQLite-backed store of documents and bundles.
///
/// Holds no state between calls besides the connection. Several stores
/// (threads or processes) may open the same database file; invariants are
/// arbitrated by the schema's unique indexes and foreign keys.
pub struct BundleStore {
    pub(crate) conn: Connection,
}

impl BundleStore {
    /// Open or create a bundle database at the given path and migrate it.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::open_with(path, &StoreOptions::default())
    }

    /// Open with explicit options.
    pub fn open_with(path: &Path, options: &StoreOptions) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        conn.busy_timeout(options.busy_timeout)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::init(conn, options)
    }

    /// Open a private in-memory database. Useful for tests and dry runs.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, &StoreOptions::default())
    }

    fn init(conn: Connection, options: &StoreOptions) -> Result<Self, StoreError> {
        conn.busy_timeout(options.busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// The schema version recorded in the database.
    pub fn schema_version(&self) -> Result<Option<i64>, StoreError> {
        Ok(schema::schema_version(&self.conn)?)
    }

    /// Start a write transaction, taking the database write lock up front.
    pub(crate) fn write_tx(&mut self) -> Result<Transaction<'_>, StoreError> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }
}
