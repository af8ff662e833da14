//! Record types and the per-database model registry
//!
//! Record types implement [`Model`] once, at compile time. Registering a type
//! with a database's [`ModelRegistry`] binds its table to that database: the
//! table is created by `Database::create_all`, and instances of the type can
//! then be added, deleted and queried through that database's session.

use crate::database::core::TableSchema;
use crate::database::error::{DatabaseError, DbResult};
use crate::database::Database;
use crate::events::{Event, EventBus};
use crate::plugin::Owner;
use parking_lot::Mutex;
use rusqlite::types::Value;
use std::any::TypeId;
use std::collections::BTreeMap;
use std::sync::Weak;
use tracing::debug;

/// A persistence-capable record type
///
/// Rows are read and written as the primary key followed by the declared
/// columns of [`Model::schema`], in declaration order.
pub trait Model: Sized + 'static {
    /// Declared name, used when registering without an explicit name
    const NAME: &'static str;

    fn schema() -> TableSchema;

    /// Primary key, `None` until the record was first added
    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    /// Values of the declared columns, in schema order
    fn values(&self) -> Vec<Value>;

    /// Build a record from a row laid out as primary key + declared columns
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self>;
}

/// A record type registered with one database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelClass {
    name: String,
    type_id: TypeId,
    type_name: &'static str,
    schema: TableSchema,
}

impl ModelClass {
    fn of<M: Model>(name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_id: TypeId::of::<M>(),
            type_name: M::NAME,
            schema: M::schema(),
        }
    }

    /// Logical name within the registry
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared name of the record type
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// True if this class is the record type `M`
    pub fn is<M: Model>(&self) -> bool {
        self.type_id == TypeId::of::<M>()
    }
}

/// Per-database mapping from logical name to record class
///
/// Names are unique within one registry only; two databases may each
/// register a class under the same name.
pub struct ModelRegistry {
    database: Weak<Database>,
    database_name: String,
    owner: Owner,
    events: EventBus,
    classes: Mutex<BTreeMap<String, ModelClass>>,
}

impl ModelRegistry {
    pub(crate) fn new(
        database: Weak<Database>,
        database_name: &str,
        owner: Owner,
        events: EventBus,
    ) -> Self {
        Self {
            database,
            database_name: database_name.to_string(),
            owner,
            events,
            classes: Mutex::new(BTreeMap::new()),
        }
    }

    /// Register `M` under `name`, or under `M::NAME` when no name is given
    pub fn register<M: Model>(&self, name: Option<&str>) -> DbResult<ModelClass> {
        let name = name.unwrap_or(M::NAME);
        let class = ModelClass::of::<M>(name);
        class.schema.validate()?;

        {
            let mut classes = self.classes.lock();
            if classes.contains_key(name) {
                return Err(DatabaseError::ModelExists {
                    name: name.to_string(),
                    database: self.database_name.clone(),
                });
            }
            classes.insert(name.to_string(), class.clone());
        }
        debug!(
            "Database class {} registered for database {}",
            name, self.database_name
        );

        if let Some(database) = self.database.upgrade() {
            self.events.publish(&Event::ModelRegistered {
                database,
                model: class.clone(),
                owner: self.owner.clone(),
            });
        }
        Ok(class)
    }

    /// Remove a class; `None` if no class has this name
    pub fn unregister(&self, name: &str) -> Option<ModelClass> {
        self.classes.lock().remove(name)
    }

    pub fn get(&self, name: &str) -> Option<ModelClass> {
        self.classes.lock().get(name).cloned()
    }

    /// All registered classes by name
    pub fn all(&self) -> BTreeMap<String, ModelClass> {
        self.classes.lock().clone()
    }

    /// True if `M` is registered under any name
    pub fn contains<M: Model>(&self) -> bool {
        self.classes.lock().values().any(|c| c.is::<M>())
    }

    pub fn len(&self) -> usize {
        self.classes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.lock().is_empty()
    }

    /// Table schemas of all registered classes
    pub(crate) fn schemas(&self) -> Vec<TableSchema> {
        self.classes
            .lock()
            .values()
            .map(|c| c.schema.clone())
            .collect()
    }
}
