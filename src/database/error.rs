//! Error types for the database registry
//!
//! Only name collisions are raised by the registry itself. Connection, schema
//! and driver failures come from SQLite and are carried through unchanged.
//! Lookups and removals never fail: they return `Option` instead.

use crate::plugin::Owner;
use thiserror::Error;

/// Result type used throughout the database module
pub type DbResult<T> = Result<T, DatabaseError>;

/// Errors produced by the directory, handles and model registries
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A database with this name is already in the directory
    #[error("Database {name} already registered by {owner}")]
    DatabaseExists { name: String, owner: Owner },

    /// A model class with this name is already registered for the database
    #[error("Database class {name} already registered for database {database}")]
    ModelExists { name: String, database: String },

    /// The connection URL could not be opened
    #[error("Failed to connect to '{url}': {reason}")]
    Connection { url: String, reason: String },

    /// Conflicting or invalid table definitions
    #[error("Schema error: {0}")]
    Schema(String),

    /// The record type was never registered with this database
    #[error("Model {model} is not registered with database {database}")]
    ModelNotRegistered { model: String, database: String },

    /// The session of this handle was closed
    #[error("Database {0} is closed")]
    Closed(String),

    /// Error reported by the SQLite driver
    #[error(transparent)]
    Driver(#[from] rusqlite::Error),
}

impl DatabaseError {
    /// True for database-name and model-name collisions
    pub fn is_already_exists(&self) -> bool {
        matches!(
            self,
            DatabaseError::DatabaseExists { .. } | DatabaseError::ModelExists { .. }
        )
    }
}
