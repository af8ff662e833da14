//! Application-wide database directory
//!
//! The directory is the only place database handles are stored. It is created
//! once by the host application and shared by `Arc`; plugin views filter it
//! by owner but never copy it.

use crate::database::core::DatabaseSettings;
use crate::database::error::{DatabaseError, DbResult};
use crate::database::Database;
use crate::events::{Event, EventBus};
use crate::plugin::Owner;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Directory filter, mirroring the optional name/owner lookup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseQuery {
    pub name: Option<String>,
    pub owner: Option<Owner>,
}

impl DatabaseQuery {
    pub fn name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn owner(mut self, owner: Owner) -> Self {
        self.owner = Some(owner);
        self
    }
}

/// Result of [`DatabaseDirectory::lookup`]
#[derive(Debug, Clone)]
pub enum Lookup {
    /// A name was given: the matching handle, if any
    One(Option<Arc<Database>>),
    /// No name was given: all handles passing the owner filter
    Many(BTreeMap<String, Arc<Database>>),
}

/// Registry of every database of one host application
///
/// All operations take the same lock, so the uniqueness check and the insert
/// of `register` cannot interleave with another registration. Events are
/// published after the lock is released.
pub struct DatabaseDirectory {
    databases: Mutex<BTreeMap<String, Arc<Database>>>,
    settings: DatabaseSettings,
    events: EventBus,
}

impl DatabaseDirectory {
    pub fn new(events: EventBus) -> Self {
        Self::with_settings(events, DatabaseSettings::default())
    }

    pub fn with_settings(events: EventBus, settings: DatabaseSettings) -> Self {
        info!("Application sql databases initialised");
        Self {
            databases: Mutex::new(BTreeMap::new()),
            settings,
            events,
        }
    }

    /// Open and store a new database
    ///
    /// Fails with [`DatabaseError::DatabaseExists`] if `name` is taken, naming
    /// the owner of the existing database. Connection failures are returned
    /// as they come from the driver. On success `DatabaseRegistered` is
    /// published before returning.
    pub fn register(
        &self,
        name: &str,
        url: &str,
        description: &str,
        owner: Owner,
    ) -> DbResult<Arc<Database>> {
        let database = {
            let mut databases = self.databases.lock();
            if let Some(existing) = databases.get(name) {
                return Err(DatabaseError::DatabaseExists {
                    name: name.to_string(),
                    owner: existing.owner().clone(),
                });
            }

            let database = Database::open(
                name,
                url,
                description,
                owner.clone(),
                &self.settings,
                &self.events,
            )?;
            databases.insert(name.to_string(), database.clone());
            database
        };
        debug!("Database registered: {} (owner: {})", name, owner);

        self.events.publish(&Event::DatabaseRegistered {
            database: database.clone(),
            owner,
        });
        Ok(database)
    }

    /// Remove a database and close its session
    ///
    /// Unknown names only log a warning. Uncommitted work of the removed
    /// database is rolled back.
    pub fn unregister(&self, name: &str) -> Option<Arc<Database>> {
        let removed = self.databases.lock().remove(name);
        match &removed {
            None => {
                warn!(
                    "Can not unregister database {}. Reason: Database does not exist.",
                    name
                );
            }
            Some(database) => {
                if let Err(e) = database.close() {
                    warn!("Failed to close database {}: {}", name, e);
                }
                debug!("Database {} unregistered", name);
            }
        }
        removed
    }

    /// Remove a database only if `owner` owns it
    ///
    /// A database owned by someone else is treated like an unknown name.
    pub fn unregister_owned(&self, name: &str, owner: &Owner) -> Option<Arc<Database>> {
        let removed = {
            let mut databases = self.databases.lock();
            match databases.get(name) {
                Some(database) if database.owner() == owner => databases.remove(name),
                _ => None,
            }
        };
        match &removed {
            None => {
                warn!(
                    "Can not unregister database {} for {}. Reason: Database does not exist.",
                    name, owner
                );
            }
            Some(database) => {
                if let Err(e) = database.close() {
                    warn!("Failed to close database {}: {}", name, e);
                }
                debug!("Database {} unregistered by {}", name, owner);
            }
        }
        removed
    }

    /// The database registered as `name`
    pub fn get(&self, name: &str) -> Option<Arc<Database>> {
        self.databases.lock().get(name).cloned()
    }

    /// The database registered as `name`, if `owner` owns it
    pub fn get_owned(&self, name: &str, owner: &Owner) -> Option<Arc<Database>> {
        self.databases
            .lock()
            .get(name)
            .filter(|db| db.owner() == owner)
            .cloned()
    }

    /// Snapshot of every registered database
    pub fn all(&self) -> BTreeMap<String, Arc<Database>> {
        self.databases.lock().clone()
    }

    /// Snapshot of the databases owned by `owner`
    pub fn owned_by(&self, owner: &Owner) -> BTreeMap<String, Arc<Database>> {
        self.databases
            .lock()
            .iter()
            .filter(|(_, db)| db.owner() == owner)
            .map(|(name, db)| (name.clone(), db.clone()))
            .collect()
    }

    /// Combined name/owner lookup
    pub fn lookup(&self, query: &DatabaseQuery) -> Lookup {
        match (&query.name, &query.owner) {
            (None, None) => Lookup::Many(self.all()),
            (Some(name), None) => Lookup::One(self.get(name)),
            (None, Some(owner)) => Lookup::Many(self.owned_by(owner)),
            (Some(name), Some(owner)) => Lookup::One(self.get_owned(name, owner)),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.databases.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.databases.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.databases.lock().is_empty()
    }
}
