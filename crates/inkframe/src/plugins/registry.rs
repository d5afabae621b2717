//! Explicit plugin registry

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::PluginFactory;

struct RegisteredPlugin {
    factory: Arc<dyn PluginFactory>,
    enabled: bool,
}

/// Maps plugin type identifiers to factories
///
/// Disabled entries behave as if they were missing.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<HashMap<String, RegisteredPlugin>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a factory under its `plugin_type`
    pub fn register(&self, factory: Arc<dyn PluginFactory>) {
        let plugin_type = factory.plugin_type().to_string();
        info!("Registered plugin: {}", plugin_type);
        self.write().insert(
            plugin_type,
            RegisteredPlugin {
                factory,
                enabled: true,
            },
        );
    }

    pub fn unregister(&self, plugin_type: &str) -> bool {
        self.write().remove(plugin_type).is_some()
    }

    /// Enable or disable a registered plugin; false if unknown
    pub fn set_enabled(&self, plugin_type: &str, enabled: bool) -> bool {
        match self.write().get_mut(plugin_type) {
            Some(entry) => {
                entry.enabled = enabled;
                debug!("Plugin {} enabled: {}", plugin_type, enabled);
                true
            }
            None => false,
        }
    }

    /// Factory for `plugin_type` if registered and enabled
    pub fn get(&self, plugin_type: &str) -> Option<Arc<dyn PluginFactory>> {
        self.read()
            .get(plugin_type)
            .filter(|entry| entry.enabled)
            .map(|entry| entry.factory.clone())
    }

    pub fn contains(&self, plugin_type: &str) -> bool {
        self.read().contains_key(plugin_type)
    }

    pub fn list_plugins(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, RegisteredPlugin>> {
        self.plugins.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, RegisteredPlugin>> {
        self.plugins.write().unwrap_or_else(|e| e.into_inner())
    }
}
