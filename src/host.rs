//! Host application
//!
//! [`Application`] is the composition root: it owns the event bus and the
//! database directory, activates and deactivates plugins, and announces each
//! deactivation so that plugin-scoped database views can clean up.
//!
//! The application keeps the view of every active plugin through its
//! [`PluginContext`], so cleanup does not depend on the plugin holding on to
//! its view.

use crate::config::{DatabaseEntry, PlugdbConfig};
use crate::database::{DatabaseDirectory, DatabaseSettings};
use crate::events::{Event, EventBus};
use crate::plugin::{Owner, Plugin, PluginContext, PluginId};
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use tracing::{info, warn};

pub struct Application {
    events: EventBus,
    directory: Arc<DatabaseDirectory>,
    context: PluginContext,
    /// Active plugins in activation order
    plugins: Vec<Box<dyn Plugin>>,
}

impl Application {
    pub fn new(settings: DatabaseSettings) -> Self {
        let events = EventBus::new();
        let directory = Arc::new(DatabaseDirectory::with_settings(events.clone(), settings));
        let context = PluginContext::new(directory.clone(), events.clone());
        Self {
            events,
            directory,
            context,
            plugins: Vec::new(),
        }
    }

    /// Build the application and register the configured databases
    pub fn from_config(config: &PlugdbConfig) -> Result<Self> {
        let app = Self::new(config.database_settings());
        app.register_configured(&config.databases)?;
        Ok(app)
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn databases(&self) -> &Arc<DatabaseDirectory> {
        &self.directory
    }

    pub fn context(&self) -> PluginContext {
        self.context.clone()
    }

    /// Register databases owned by the application itself
    pub fn register_configured(&self, entries: &[DatabaseEntry]) -> Result<()> {
        for entry in entries {
            self.directory
                .register(
                    &entry.name,
                    &entry.url,
                    &entry.description,
                    Owner::Application,
                )
                .with_context(|| format!("Failed to register database {}", entry.name))?;
        }
        Ok(())
    }

    /// Activate a plugin
    ///
    /// If the plugin fails to activate, databases it registered so far are
    /// unregistered and the plugin is dropped.
    pub fn activate(&mut self, mut plugin: Box<dyn Plugin>) -> Result<()> {
        let name = plugin.name().to_string();
        if self.is_active(&name) {
            return Err(anyhow!("Plugin {} is already active", name));
        }

        let id = PluginId::new(&name);
        if let Err(e) = plugin.activate(&self.context) {
            drop(plugin);
            self.context.release(&id);
            self.reclaim(&id);
            return Err(e.context(format!("Failed to activate plugin {}", name)));
        }

        self.plugins.push(plugin);
        info!("Plugin {} activated", name);
        self.events.publish(&Event::PluginActivated {
            plugin: PluginId::new(&name),
        });
        Ok(())
    }

    /// Deactivate a plugin and announce it
    ///
    /// Returns false if no plugin with this name is active. A failing
    /// `Plugin::deactivate` is logged; the announcement happens regardless.
    pub fn deactivate(&mut self, name: &str) -> bool {
        let Some(index) = self.plugins.iter().position(|p| p.name() == name) else {
            warn!("Can not deactivate plugin {}. Reason: Plugin is not active.", name);
            return false;
        };
        let mut plugin = self.plugins.remove(index);

        if let Err(e) = plugin.deactivate() {
            warn!("Plugin {} failed to deactivate cleanly: {:#}", name, e);
        }
        let id = PluginId::new(name);
        self.events.publish(&Event::PluginDeactivated { plugin: id.clone() });
        drop(plugin);
        self.context.release(&id);
        // databases registered straight through the directory
        self.reclaim(&id);
        info!("Plugin {} deactivated", name);
        true
    }

    fn reclaim(&self, plugin: &PluginId) {
        let owner = Owner::Plugin(plugin.clone());
        for db_name in self.directory.owned_by(&owner).into_keys() {
            self.directory.unregister_owned(&db_name, &owner);
        }
    }

    /// Deactivate every plugin, most recently activated first
    pub fn shutdown(&mut self) {
        let names: Vec<String> = self
            .plugins
            .iter()
            .rev()
            .map(|p| p.name().to_string())
            .collect();
        for name in names {
            self.deactivate(&name);
        }
    }

    pub fn is_active(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name() == name)
    }

    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.name().to_string()).collect()
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new(DatabaseSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::model::tests::User;
    use crate::database::SqlDatabases;
    use crate::events::{EventKind, Phase};
    use parking_lot::Mutex;

    const MEMORY: &str = "sqlite:///:memory:";

    /// Plugin registering `my_db` on activation
    struct DatabasePlugin {
        name: String,
        databases: Option<SqlDatabases>,
    }

    impl DatabasePlugin {
        fn boxed(name: &str) -> Box<dyn Plugin> {
            Box::new(Self {
                name: name.to_string(),
                databases: None,
            })
        }
    }

    impl Plugin for DatabasePlugin {
        fn name(&self) -> &str {
            &self.name
        }

        fn activate(&mut self, ctx: &PluginContext) -> Result<()> {
            let databases = ctx.databases(&self.name)?;
            databases.register(&format!("{}_db", self.name), MEMORY, "test_database")?;
            self.databases = Some(databases);
            Ok(())
        }

        fn deactivate(&mut self) -> Result<()> {
            Err(anyhow!("nothing to do"))
        }
    }

    /// Plugin registering two databases, the second one clashing
    struct ClashingPlugin;

    impl Plugin for ClashingPlugin {
        fn name(&self) -> &str {
            "Clashing"
        }

        fn activate(&mut self, ctx: &PluginContext) -> Result<()> {
            let databases = ctx.databases(self.name())?;
            databases.register("clash_own", MEMORY, "")?;
            databases.register("P1_db", MEMORY, "")?;
            Ok(())
        }
    }

    #[test]
    fn test_activate_registers_database() {
        let mut app = Application::default();
        app.activate(DatabasePlugin::boxed("P1")).unwrap();

        let db = app.databases().get("P1_db").unwrap();
        assert_eq!(db.owner(), &Owner::Plugin(PluginId::new("P1")));
        assert!(app.is_active("P1"));
        assert!(app.activate(DatabasePlugin::boxed("P1")).is_err());
    }

    #[test]
    fn test_deactivate_reclaims_databases() {
        let mut app = Application::default();
        app.activate(DatabasePlugin::boxed("P1")).unwrap();
        app.activate(DatabasePlugin::boxed("P2")).unwrap();
        let db = app.databases().get("P1_db").unwrap();

        assert!(app.deactivate("P1"));
        assert!(app
            .databases()
            .owned_by(&Owner::Plugin(PluginId::new("P1")))
            .is_empty());
        assert!(db.is_closed());
        assert!(app.databases().get("P2_db").is_some());
        // the facade went away with the plugin
        assert!(!app.events().is_subscribed("P1_sql_deactivation"));

        assert!(!app.deactivate("P1"));
    }

    #[test]
    fn test_failed_activation_rolls_back() {
        let mut app = Application::default();
        app.activate(DatabasePlugin::boxed("P1")).unwrap();

        let err = app.activate(Box::new(ClashingPlugin)).unwrap_err();
        assert!(format!("{:#}", err).contains("already registered by P1"));
        assert!(!app.is_active("Clashing"));
        assert!(app.databases().get("clash_own").is_none());
        assert!(app.databases().get("P1_db").is_some());
        assert!(!app.events().is_subscribed("Clashing_sql_deactivation"));
    }

    /// Plugin that uses its view without keeping it
    struct TransientPlugin {
        lookups: usize,
    }

    impl Plugin for TransientPlugin {
        fn name(&self) -> &str {
            "Transient"
        }

        fn activate(&mut self, ctx: &PluginContext) -> Result<()> {
            ctx.databases(self.name())?.register("t_db", MEMORY, "")?;
            for _ in 0..self.lookups {
                assert!(ctx.databases(self.name())?.get("t_db").is_some());
            }
            Ok(())
        }
    }

    /// Plugin registering through the directory instead of its view
    struct DirectPlugin;

    impl Plugin for DirectPlugin {
        fn name(&self) -> &str {
            "Direct"
        }

        fn activate(&mut self, ctx: &PluginContext) -> Result<()> {
            ctx.directory().register(
                "direct_db",
                MEMORY,
                "",
                Owner::Plugin(PluginId::new(self.name())),
            )?;
            Ok(())
        }
    }

    fn owned_by(app: &Application, plugin: &str) -> Vec<String> {
        app.databases()
            .owned_by(&Owner::Plugin(PluginId::new(plugin)))
            .into_keys()
            .collect()
    }

    #[test]
    fn test_deactivate_reclaims_without_kept_view() {
        let mut app = Application::default();
        app.activate(Box::new(TransientPlugin { lookups: 0 })).unwrap();
        assert_eq!(owned_by(&app, "Transient"), vec!["t_db".to_string()]);
        assert!(app.events().is_subscribed("Transient_sql_deactivation"));

        assert!(app.deactivate("Transient"));
        assert!(owned_by(&app, "Transient").is_empty());
        assert!(!app.events().is_subscribed("Transient_sql_deactivation"));
    }

    #[test]
    fn test_view_requested_repeatedly() {
        let mut app = Application::default();
        app.activate(Box::new(TransientPlugin { lookups: 2 })).unwrap();
        assert!(app.is_active("Transient"));

        app.deactivate("Transient");
        assert!(owned_by(&app, "Transient").is_empty());

        // reactivation builds a fresh view
        app.activate(Box::new(TransientPlugin { lookups: 1 })).unwrap();
        assert_eq!(owned_by(&app, "Transient"), vec!["t_db".to_string()]);
    }

    #[test]
    fn test_deactivate_reclaims_direct_registrations() {
        let mut app = Application::default();
        app.activate(Box::new(DirectPlugin)).unwrap();
        let db = app.databases().get("direct_db").unwrap();

        app.deactivate("Direct");
        assert!(owned_by(&app, "Direct").is_empty());
        assert!(db.is_closed());
    }

    #[test]
    fn test_deactivation_announced_once() {
        let mut app = Application::default();
        let count = Arc::new(Mutex::new(0));
        let counter = count.clone();
        let _sub = app
            .events()
            .subscribe(
                "counter",
                EventKind::PluginDeactivated,
                Phase::Normal,
                move |_| *counter.lock() += 1,
            )
            .unwrap();

        app.activate(DatabasePlugin::boxed("P1")).unwrap();
        app.deactivate("P1");
        assert_eq!(*count.lock(), 1);
    }

    #[test]
    fn test_shutdown() {
        let mut app = Application::default();
        app.register_configured(&[DatabaseEntry {
            name: "main".into(),
            url: MEMORY.into(),
            description: "application database".into(),
        }])
        .unwrap();
        app.activate(DatabasePlugin::boxed("P1")).unwrap();
        app.activate(DatabasePlugin::boxed("P2")).unwrap();

        app.shutdown();
        assert!(app.plugin_names().is_empty());
        assert_eq!(app.databases().names(), vec!["main".to_string()]);
        assert_eq!(
            app.databases().get("main").unwrap().owner(),
            &Owner::Application
        );
    }

    #[test]
    fn test_model_registration_event() {
        let app = Application::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let _sub = app
            .events()
            .subscribe(
                "models",
                EventKind::ModelRegistered,
                Phase::Normal,
                move |event| {
                    if let Event::ModelRegistered {
                        database,
                        model,
                        owner,
                    } = event
                    {
                        log.lock().push(format!(
                            "{}:{}:{}",
                            database.name(),
                            model.name(),
                            owner
                        ));
                    }
                },
            )
            .unwrap();

        let ctx = app.context();
        let databases = ctx.databases("P1").unwrap();
        let db = databases.register("my_db", MEMORY, "").unwrap();
        db.models().register::<User>(None).unwrap();
        assert_eq!(*seen.lock(), vec!["my_db:User:P1".to_string()]);
    }

    #[test]
    fn test_same_model_name_in_two_databases() {
        let app = Application::default();
        let a = app
            .databases()
            .register("a", MEMORY, "", Owner::Application)
            .unwrap();
        let b = app
            .databases()
            .register("b", MEMORY, "", Owner::Application)
            .unwrap();

        a.models().register::<User>(None).unwrap();
        b.models().register::<User>(None).unwrap();
        assert!(a.models().register::<User>(None).is_err());
    }

    #[test]
    fn test_record_round_trip_through_plugin_database() {
        let mut app = Application::default();
        app.activate(DatabasePlugin::boxed("P1")).unwrap();
        let db = app.databases().get("P1_db").unwrap();

        let class = db.models().register::<User>(None).unwrap();
        assert_eq!(db.models().get("User"), Some(class));
        db.create_all().unwrap();

        let mut user = User::new("test", "Test Test", "password");
        db.add(&mut user).unwrap();
        let found = db
            .query::<User>()
            .unwrap()
            .filter_by("name", "test")
            .first()
            .unwrap();
        assert_eq!(found, Some(user));

        db.rollback().unwrap();
        assert!(db
            .query::<User>()
            .unwrap()
            .filter_by("name", "test")
            .first()
            .unwrap()
            .is_none());
    }
}
