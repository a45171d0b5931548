mod migration;
mod schema;

use std::path::Path;

use rusqlite::Connection;

use crate::error::Result;
use migration::apply_pending_migrations;

/// Database wrapper providing connection management and schema migrations.
pub struct Database {
    conn: Connection,
    created: bool,
}

impl Database {
    /// Opens an in-memory SQLite database.
    ///
    /// Automatically initializes the schema on connection open.
    pub fn in_memory() -> Result<Self> {
        Self::initialize(Connection::open_in_memory()?)
    }

    /// Opens a file-based SQLite database at the given path.
    ///
    /// Creates the database file if it does not exist.
    /// Automatically applies pending migrations on connection open.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::initialize(Connection::open(path)?)
    }

    fn initialize(mut conn: Connection) -> Result<Self> {
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        let applied = apply_pending_migrations(&mut conn)?;
        Ok(Self {
            conn,
            created: applied.contains(&1),
        })
    }

    /// Returns true when this open created the schema from scratch.
    pub fn was_created(&self) -> bool {
        self.created
    }

    /// Returns a reference to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Returns a mutable reference, needed to start transactions.
    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.conn
    }
}

#[cfg(test)]
#[path = "db/tests.rs"]
mod tests;
