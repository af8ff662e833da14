//! Database connection management
//!
//! This module turns an opaque connection URL into a configured SQLite
//! connection. The URL is only inspected far enough to pick the SQLite
//! target; everything else is left to the driver.

use crate::database::error::{DatabaseError, DbResult};
use rusqlite::Connection;
use std::path::PathBuf;
use std::time::Duration;

/// Connection-level settings applied to every database handle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseSettings {
    /// How long a statement waits on a locked database before failing.
    /// `None` keeps the driver default.
    pub busy_timeout: Option<Duration>,
}

impl DatabaseSettings {
    pub fn with_busy_timeout(busy_timeout: Duration) -> Self {
        Self {
            busy_timeout: Some(busy_timeout),
        }
    }
}

/// Where a connection URL points to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionTarget {
    Memory,
    File(PathBuf),
}

impl ConnectionTarget {
    /// Parse a `sqlite://` URL
    ///
    /// `sqlite://` and `sqlite:///:memory:` open an in-memory database,
    /// `sqlite:///relative.db` a relative path and `sqlite:////abs/file.db`
    /// an absolute one.
    pub fn parse(url: &str) -> DbResult<Self> {
        let rest = url
            .strip_prefix("sqlite://")
            .ok_or_else(|| DatabaseError::Connection {
                url: url.to_string(),
                reason: "unsupported driver, expected a sqlite:// URL".to_string(),
            })?;

        if rest.is_empty() {
            return Ok(ConnectionTarget::Memory);
        }

        let path = rest
            .strip_prefix('/')
            .ok_or_else(|| DatabaseError::Connection {
                url: url.to_string(),
                reason: "sqlite URLs must not carry a host".to_string(),
            })?;

        match path {
            "" | ":memory:" => Ok(ConnectionTarget::Memory),
            p => Ok(ConnectionTarget::File(PathBuf::from(p))),
        }
    }
}

/// Core database connection wrapper
///
/// `DatabaseConn` owns one SQLite connection and applies the same
/// configuration to file-based and in-memory databases.
pub struct DatabaseConn {
    pub conn: Connection,
}

impl DatabaseConn {
    /// Open the database a connection URL points to
    pub fn open(url: &str, settings: &DatabaseSettings) -> DbResult<Self> {
        let target = ConnectionTarget::parse(url)?;
        let conn = match &target {
            ConnectionTarget::Memory => Connection::open_in_memory(),
            ConnectionTarget::File(path) => Connection::open(path),
        }
        .map_err(|e| DatabaseError::Connection {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let db = DatabaseConn { conn };
        db.configure(&target, settings)
            .map_err(|e| DatabaseError::Connection {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(db)
    }

    /// Open an in-memory database with default settings
    pub fn open_in_memory() -> DbResult<Self> {
        Self::open("sqlite://", &DatabaseSettings::default())
    }

    fn configure(
        &self,
        target: &ConnectionTarget,
        settings: &DatabaseSettings,
    ) -> rusqlite::Result<()> {
        if let Some(timeout) = settings.busy_timeout {
            self.conn.busy_timeout(timeout)?;
        }

        if let ConnectionTarget::File(_) = target {
            // WAL keeps readers of other handles unblocked while a session writes
            let _: String = self
                .conn
                .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
            self.conn.execute("PRAGMA synchronous=NORMAL", [])?;
        }

        self.conn.execute("PRAGMA foreign_keys=ON", [])?;
        Ok(())
    }

    /// Execute a SQL statement
    pub fn execute(&self, sql: &str) -> DbResult<usize> {
        Ok(self.conn.execute(sql, [])?)
    }

    /// Execute a SQL statement with parameters
    pub fn execute_with_params<P: rusqlite::Params>(&self, sql: &str, params: P) -> DbResult<usize> {
        Ok(self.conn.execute(sql, params)?)
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> DbResult<bool> {
        let count: i32 = self.conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [table_name],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> DbResult<u64> {
        let query = format!("SELECT COUNT(*) FROM \"{}\"", table_name);
        let count: u64 = self.conn.query_row(&query, [], |row| row.get(0))?;
        Ok(count)
    }

    /// Whether a transaction is currently open on this connection
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Open a transaction unless one is already running
    pub fn begin(&self) -> DbResult<()> {
        if !self.in_transaction() {
            self.conn.execute_batch("BEGIN")?;
        }
        Ok(())
    }

    /// Commit the running transaction, if any
    pub fn commit(&self) -> DbResult<()> {
        if self.in_transaction() {
            self.conn.execute_batch("COMMIT")?;
        }
        Ok(())
    }

    /// Roll back the running transaction, if any
    pub fn rollback(&self) -> DbResult<()> {
        if self.in_transaction() {
            self.conn.execute_batch("ROLLBACK")?;
        }
        Ok(())
    }

    /// Close the connection, discarding uncommitted work
    pub fn close(self) -> DbResult<()> {
        self.rollback()?;
        self.conn.close().map_err(|(_, e)| DatabaseError::Driver(e))
    }
}
