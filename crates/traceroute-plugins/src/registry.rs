//! Named plugin constructors and enable-list instantiation.

use crate::{DebugPlugin, DefaultPlugin, Plugin};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// Opaque constructor parameters; each plugin decides how to read them.
pub type PluginParams = serde_json::Value;

/// Builds a plugin, or returns `None` if the parameters are unusable.
pub type PluginConstructor = Box<dyn Fn(&PluginParams) -> Option<Box<dyn Plugin>> + Send + Sync>;

/// Maps plugin names to constructors.
///
/// Built once during startup; lookups afterwards take `&self` only.
#[derive(Default)]
pub struct PluginRegistry {
    constructors: HashMap<String, PluginConstructor>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the bundled `default` and `debug` plugins.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(DefaultPlugin::NAME, DefaultPlugin::construct);
        registry.register(DebugPlugin::NAME, DebugPlugin::construct);
        registry
    }

    /// Creates a registry from an explicit list of constructors.
    pub fn from_constructors<I>(constructors: I) -> Self
    where
        I: IntoIterator<Item = (String, PluginConstructor)>,
    {
        Self {
            constructors: constructors.into_iter().collect(),
        }
    }

    /// Registers `constructor` under `name`, replacing any earlier one.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&PluginParams) -> Option<Box<dyn Plugin>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Instantiates every registered plugin named in the comma-separated
    /// `enabled` list, in list order.
    ///
    /// Unknown names, and plugins whose constructor rejects `params`, are
    /// skipped.
    pub fn create_plugins(&self, enabled: &str, params: &PluginParams) -> Vec<Box<dyn Plugin>> {
        let mut plugins = Vec::new();
        for name in enabled.split(',').map(str::trim) {
            let Some(constructor) = self.constructors.get(name) else {
                if !name.is_empty() {
                    debug!(plugin = name, "Ignoring unknown plugin");
                }
                continue;
            };
            match constructor(params) {
                Some(plugin) => plugins.push(plugin),
                None => debug!(plugin = name, "Plugin rejected its parameters"),
            }
        }
        plugins
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.constructors.keys().collect();
        names.sort();
        f.debug_struct("PluginRegistry")
            .field("plugins", &names)
            .finish()
    }
}
