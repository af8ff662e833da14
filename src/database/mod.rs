//! Database module
//!
//! This module provides all database functionality of plugdb, organized into:
//!
//! - **core**: SQLite connections opened from URLs, table schemas
//! - **session**: The per-handle session with lazily opened transactions
//! - **handle**: [`Database`], one named database and its pass-through operations
//! - **model**: Record types and the per-database [`ModelRegistry`]
//! - **directory**: The application-wide [`DatabaseDirectory`]
//! - **plugin**: [`SqlDatabases`], the per-plugin view with deactivation cleanup
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── connection  # URL parsing, DatabaseConn wrapper
//! │   └── schema      # TableSchema builder and SchemaManager
//! │
//! ├── session/        # One session per handle
//! ├── handle          # Database handle + Query
//! ├── model           # Model trait, ModelClass, ModelRegistry
//! ├── directory       # name -> handle, owner
//! └── plugin          # per-plugin filtered view
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use plugdb::database::DatabaseDirectory;
//! use plugdb::events::EventBus;
//! use plugdb::plugin::Owner;
//!
//! let directory = DatabaseDirectory::new(EventBus::new());
//! let db = directory.register("my_db", "sqlite:///:memory:", "test", Owner::Application)?;
//!
//! db.models().register::<User>(None)?;
//! db.create_all()?;
//!
//! let mut user = User::new("test");
//! db.add(&mut user)?;
//! let found = db.query::<User>()?.filter_by("name", "test").first()?;
//! db.commit()?;
//! ```

pub mod core;
pub mod directory;
pub mod error;
pub mod handle;
pub mod model;
pub mod plugin;
pub mod session;

pub use core::{
    ColumnDef, ColumnType, ConnectionTarget, DatabaseConn, DatabaseSettings, SchemaManager,
    TableSchema,
};
pub use directory::{DatabaseDirectory, DatabaseQuery, Lookup};
pub use error::{DatabaseError, DbResult};
pub use handle::{Database, DatabaseInfo, Query};
pub use model::{Model, ModelClass, ModelRegistry};
pub use plugin::SqlDatabases;
pub use session::{Session, SessionGuard};
