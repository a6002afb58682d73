use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use thiserror::Error;

mod progress_repo;

/// SQLite-backed local progress cache.
///
/// The cache contract is synchronous, so this wraps a single `rusqlite`
/// connection behind a mutex; every call runs on the caller's thread.
#[derive(Clone)]
pub struct SqliteProgressCache {
    conn: Arc<Mutex<Connection>>,
}

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SqliteInitError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

impl SqliteProgressCache {
    /// Open (or create) the cache database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the database cannot be opened or the
    /// schema cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SqliteInitError> {
        Self::initialize(Connection::open(path)?)
    }

    /// Open a cache that lives only as long as the connection. Useful for
    /// tests and ephemeral sessions.
    ///
    /// # Errors
    ///
    /// Returns `SqliteInitError` if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, SqliteInitError> {
        Self::initialize(Connection::open_in_memory()?)
    }

    fn initialize(conn: Connection) -> Result<Self, SqliteInitError> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "busy_timeout", 5000)?;
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS progress_cache (
                user_id               TEXT NOT NULL,
                course_id             TEXT NOT NULL,
                module_index          INTEGER NOT NULL,
                percent               INTEGER NOT NULL,
                watch_time_seconds    REAL NOT NULL,
                last_position_seconds REAL NOT NULL,
                last_updated_at       TEXT NOT NULL,
                PRIMARY KEY (user_id, course_id, module_index)
            )
            ",
        )?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> &Mutex<Connection> {
        &self.conn
    }
}
