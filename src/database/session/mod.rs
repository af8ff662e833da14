//! Per-handle database session
//!
//! A session owns the connection of one database handle. Autocommit is off
//! from the caller's point of view: the first write opens a transaction that
//! stays open until `commit` or `rollback`. Reads run on the same connection
//! and therefore see uncommitted writes of the session.
//!
//! Sessions are not shared between units of work. The handle hands out a
//! [`SessionGuard`] that holds the session exclusively.

use crate::database::core::{DatabaseConn, DatabaseSettings};
use crate::database::error::{DatabaseError, DbResult};
use parking_lot::MutexGuard;

pub struct Session {
    database: String,
    conn: Option<DatabaseConn>,
}

/// Exclusive access to a handle's session
pub type SessionGuard<'a> = MutexGuard<'a, Session>;

impl Session {
    /// Open a session for the database `database` at `url`
    pub fn open(database: &str, url: &str, settings: &DatabaseSettings) -> DbResult<Self> {
        Ok(Self {
            database: database.to_string(),
            conn: Some(DatabaseConn::open(url, settings)?),
        })
    }

    /// The live connection, unless the session was closed
    pub fn conn(&self) -> DbResult<&DatabaseConn> {
        self.conn
            .as_ref()
            .ok_or_else(|| DatabaseError::Closed(self.database.clone()))
    }

    /// Direct access to the SQLite connection
    pub fn connection(&self) -> DbResult<&rusqlite::Connection> {
        Ok(&self.conn()?.conn)
    }

    pub fn is_closed(&self) -> bool {
        self.conn.is_none()
    }

    pub fn in_transaction(&self) -> bool {
        self.conn.as_ref().is_some_and(|c| c.in_transaction())
    }

    /// Connection prepared for a write: a transaction is open afterwards
    pub fn writer(&self) -> DbResult<&DatabaseConn> {
        let conn = self.conn()?;
        conn.begin()?;
        Ok(conn)
    }

    pub fn commit(&self) -> DbResult<()> {
        self.conn()?.commit()
    }

    pub fn rollback(&self) -> DbResult<()> {
        self.conn()?.rollback()
    }

    /// Close the connection, rolling back pending work
    ///
    /// Closing twice is a no-op. A closed session never reconnects.
    pub fn close(&mut self) -> DbResult<()> {
        match self.conn.take() {
            Some(conn) => conn.close(),
            None => Ok(()),
        }
    }
}
