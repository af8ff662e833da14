//! Core database infrastructure
//!
//! This module provides the foundational database components used by every handle:
//! - `DatabaseConn`: SQLite connection wrapper opened from a connection URL
//! - `TableSchema`: Compile-time table descriptions of record types
//! - `SchemaManager`: Table materialisation and conflict detection

mod connection;
mod schema;

pub use connection::{ConnectionTarget, DatabaseConn, DatabaseSettings};
pub use schema::{quote_ident, ColumnDef, ColumnType, SchemaManager, TableSchema};
