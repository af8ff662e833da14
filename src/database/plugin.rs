//! Plugin-scoped view over the database directory
//!
//! Each plugin gets its own [`SqlDatabases`]. It registers and looks up
//! databases as if the plugin owned them exclusively, while every entry
//! lives in the shared [`DatabaseDirectory`].
//!
//! On construction the view subscribes to the post-deactivation event of its
//! plugin in the cleanup phase, so it runs after every other consumer of
//! that event, and unregisters all databases the plugin still owns. Clones
//! share that subscription; it is revoked when the last clone is dropped.

use crate::database::error::DbResult;
use crate::database::{Database, DatabaseDirectory};
use crate::events::{Event, EventBus, EventError, EventKind, Phase, Subscription};
use crate::plugin::{Owner, PluginId};
use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use tracing::debug;

#[derive(Clone)]
pub struct SqlDatabases {
    owner: Owner,
    directory: Arc<DatabaseDirectory>,
    subscription: Arc<Subscription>,
}

impl SqlDatabases {
    /// Create the view of `plugin` and hook its deactivation cleanup
    ///
    /// Fails if a view for the same plugin is already subscribed on `events`.
    pub fn new(
        plugin: PluginId,
        directory: Arc<DatabaseDirectory>,
        events: &EventBus,
    ) -> Result<Self, EventError> {
        let receiver = format!("{}_sql_deactivation", plugin);
        let owner = Owner::Plugin(plugin.clone());

        let cleanup_directory: Weak<DatabaseDirectory> = Arc::downgrade(&directory);
        let cleanup_owner = owner.clone();
        let subscription = events.subscribe(
            &receiver,
            EventKind::PluginDeactivated,
            Phase::Cleanup,
            move |event| {
                let Event::PluginDeactivated { plugin: deactivated } = event else {
                    return;
                };
                if *deactivated != plugin {
                    return;
                }
                if let Some(directory) = cleanup_directory.upgrade() {
                    deactivate_databases(&directory, &cleanup_owner);
                }
            },
        )?;

        debug!("Pattern sql databases initialised for {}", owner);
        Ok(Self {
            owner,
            directory,
            subscription: Arc::new(subscription),
        })
    }

    pub fn owner(&self) -> &Owner {
        &self.owner
    }

    /// Name of the deactivation subscription
    pub fn receiver(&self) -> &str {
        self.subscription.receiver()
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_active()
    }

    /// Register a database owned by this plugin
    pub fn register(&self, name: &str, url: &str, description: &str) -> DbResult<Arc<Database>> {
        self.directory
            .register(name, url, description, self.owner.clone())
    }

    /// Unregister one of this plugin's databases
    ///
    /// Databases of other owners are left alone and reported as not found.
    pub fn unregister(&self, name: &str) -> Option<Arc<Database>> {
        self.directory.unregister_owned(name, &self.owner)
    }

    /// This plugin's database called `name`
    pub fn get(&self, name: &str) -> Option<Arc<Database>> {
        self.directory.get_owned(name, &self.owner)
    }

    /// All databases of this plugin
    pub fn all(&self) -> BTreeMap<String, Arc<Database>> {
        self.directory.owned_by(&self.owner)
    }
}

fn deactivate_databases(directory: &DatabaseDirectory, owner: &Owner) {
    for name in directory.owned_by(owner).into_keys() {
        directory.unregister_owned(&name, owner);
    }
    debug!("Sql databases of {} deactivated", owner);
}
