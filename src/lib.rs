#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! plugdb - SQL databases owned by host-application plugins
//!
//! plugdb lets independently activated plugins each register and use their own
//! SQLite databases while the host application keeps a single directory of
//! every database, and reclaims a plugin's databases once it is deactivated.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | `display` | Table formatting of database listings | `tabled` |
//! | `cli` | The `plugdb` binary | `clap`, `tracing-subscriber` |
//!
//! # Architecture
//!
//! - **[`database`]**: Directory, handles, sessions, model registries and the
//!   per-plugin [`SqlDatabases`] view
//! - **[`events`]**: Typed synchronous event bus with revocable subscriptions
//! - **[`plugin`]**: Plugin capability trait and owner identities
//! - **[`host`]**: The [`Application`] composition root
//! - **[`config`]**: Configuration management
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use plugdb::{Application, Plugin, PluginContext, SqlDatabases};
//!
//! struct Inventory {
//!     databases: Option<SqlDatabases>,
//! }
//!
//! impl Plugin for Inventory {
//!     fn name(&self) -> &str {
//!         "Inventory"
//!     }
//!
//!     fn activate(&mut self, ctx: &PluginContext) -> anyhow::Result<()> {
//!         let databases = ctx.databases(self.name())?;
//!         databases.register("inventory", "sqlite:///inventory.db", "stock levels")?;
//!         self.databases = Some(databases);
//!         Ok(())
//!     }
//! }
//!
//! let mut app = Application::default();
//! app.activate(Box::new(Inventory { databases: None }))?;
//! assert!(app.databases().get("inventory").is_some());
//!
//! // unregisters and closes "inventory"
//! app.deactivate("Inventory");
//! ```

pub mod config;
pub mod database;
pub mod events;
pub mod host;
pub mod plugin;
pub mod utils;

pub use config::{DatabaseEntry, PlugdbConfig};

pub use database::{
    ColumnType, Database, DatabaseDirectory, DatabaseError, DatabaseInfo, DatabaseSettings,
    DbResult, Model, ModelClass, ModelRegistry, Query, SqlDatabases, TableSchema,
};

pub use events::{Event, EventBus, EventKind, Phase, Subscription};
pub use host::Application;
pub use plugin::{Owner, Plugin, PluginContext, PluginId};
pub use utils::OutputFormat;
