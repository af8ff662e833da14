//! Plugin identity and capability
//!
//! A plugin is anything implementing [`Plugin`]: it has a name and lifecycle
//! hooks, and receives a [`PluginContext`] on activation from which it can
//! build its own [`SqlDatabases`] view.

use crate::database::{DatabaseDirectory, SqlDatabases};
use crate::events::EventBus;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Name of a plugin, unique within one host application
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct PluginId(String);

impl PluginId {
    pub fn new(name: &str) -> Self {
        Self(name.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Who registered a database
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "name")]
pub enum Owner {
    /// The host application itself
    Application,
    Plugin(PluginId),
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Application => f.write_str("application"),
            Owner::Plugin(id) => write!(f, "{}", id),
        }
    }
}

impl From<PluginId> for Owner {
    fn from(id: PluginId) -> Self {
        Owner::Plugin(id)
    }
}

/// Capability every hosted plugin provides
pub trait Plugin: Send {
    fn name(&self) -> &str;

    /// Called once when the host activates the plugin.
    ///
    /// An error aborts the activation.
    fn activate(&mut self, ctx: &PluginContext) -> anyhow::Result<()>;

    /// Called once when the host deactivates the plugin, before the
    /// post-deactivation event is published.
    fn deactivate(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Host resources handed to a plugin on activation
///
/// Clones share the database views built so far, one per plugin.
#[derive(Clone)]
pub struct PluginContext {
    directory: Arc<DatabaseDirectory>,
    events: EventBus,
    views: Arc<Mutex<BTreeMap<PluginId, SqlDatabases>>>,
}

impl PluginContext {
    pub fn new(directory: Arc<DatabaseDirectory>, events: EventBus) -> Self {
        Self {
            directory,
            events,
            views: Arc::new(Mutex::new(BTreeMap::new())),
        }
    }

    pub fn directory(&self) -> &Arc<DatabaseDirectory> {
        &self.directory
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// The database view owned by `plugin`
    ///
    /// The first call builds the view, later calls return it again. The
    /// context keeps it alive until [`PluginContext::release`], so it removes
    /// all databases of `plugin` once the host announces its deactivation
    /// even if the plugin dropped its copy.
    pub fn databases(&self, plugin: &str) -> anyhow::Result<SqlDatabases> {
        let id = PluginId::new(plugin);
        let mut views = self.views.lock();
        if let Some(view) = views.get(&id) {
            return Ok(view.clone());
        }
        let view = SqlDatabases::new(id.clone(), self.directory.clone(), &self.events)?;
        views.insert(id, view.clone());
        Ok(view)
    }

    /// Forget the view of `plugin`
    ///
    /// Its subscription ends once the plugin drops its own copies as well.
    pub fn release(&self, plugin: &PluginId) -> Option<SqlDatabases> {
        self.views.lock().remove(plugin)
    }
}
