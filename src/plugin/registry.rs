//! Plugin registry
//!
//! Membership is by identity (`Arc::ptr_eq`), not by name: two distinct
//! instances sharing a name are both tracked, and `get_by_name` returns the
//! earliest registered one.

use super::Plugin;
use crate::error::ManagerError;
use crate::telemetry;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Registry of active plugin instances
#[derive(Default)]
pub struct PluginRegistry {
    plugins: RwLock<Vec<Arc<dyn Plugin>>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<dyn Plugin>>> {
        self.plugins.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<dyn Plugin>>> {
        self.plugins.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a plugin. Registering the same instance twice is a no-op.
    pub fn register(&self, plugin: Arc<dyn Plugin>) {
        let mut plugins = self.write();
        if plugins.iter().any(|p| Arc::ptr_eq(p, &plugin)) {
            debug!(plugin = plugin.metadata().name(), "Plugin already registered");
            return;
        }

        info!(
            plugin = plugin.metadata().name(),
            version = plugin.metadata().version(),
            "Registering plugin"
        );
        plugins.push(plugin);
        telemetry::set_plugins_registered(plugins.len());
    }

    /// Stop tracking a plugin. Does not call `on_disable`.
    pub fn unregister(&self, plugin: &Arc<dyn Plugin>) {
        let mut plugins = self.write();
        let before = plugins.len();
        plugins.retain(|p| !Arc::ptr_eq(p, plugin));
        if plugins.len() != before {
            info!(plugin = plugin.metadata().name(), "Unregistered plugin");
            telemetry::set_plugins_registered(plugins.len());
        }
    }

    pub fn contains(&self, plugin: &Arc<dyn Plugin>) -> bool {
        self.read().iter().any(|p| Arc::ptr_eq(p, plugin))
    }

    /// First registered plugin whose metadata name equals `name`
    pub fn get_by_name(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.read()
            .iter()
            .find(|p| p.metadata().name() == name)
            .cloned()
    }

    /// Names in registration order (duplicates included)
    pub fn names(&self) -> Vec<String> {
        self.read()
            .iter()
            .map(|p| p.metadata().name().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call `on_enable` on every plugin in registration order.
    ///
    /// Stops at the first failure. Callbacks run outside the registry lock
    /// so a plugin may register or unregister others while enabling.
    pub fn enable_all(&self) -> Result<(), ManagerError> {
        let snapshot: Vec<_> = self.read().clone();
        for plugin in snapshot {
            let name = plugin.metadata().name().to_string();
            plugin
                .on_enable()
                .map_err(|source| ManagerError::Plugin { name: name.clone(), source })?;
            info!(plugin = %name, "Plugin enabled");
        }
        Ok(())
    }

    /// Call `on_disable` on every plugin in reverse registration order.
    pub fn disable_all(&self) -> Result<(), ManagerError> {
        let snapshot: Vec<_> = self.read().clone();
        for plugin in snapshot.into_iter().rev() {
            let name = plugin.metadata().name().to_string();
            plugin
                .on_disable()
                .map_err(|source| ManagerError::Plugin { name: name.clone(), source })?;
            info!(plugin = %name, "Plugin disabled");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{PluginMetadata, PluginResult};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Recorder {
        metadata: PluginMetadata,
        enabled: AtomicUsize,
        log: Arc<Mutex<Vec<String>>>,
        fail_enable: bool,
    }

    impl Recorder {
        fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                metadata: PluginMetadata::new(name, "test plugin", "0.1.0", "tests"),
                enabled: AtomicUsize::new(0),
                log: Arc::clone(log),
                fail_enable: false,
            })
        }

        fn failing(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Arc<Self> {
            Arc::new(Self {
                metadata: PluginMetadata::new(name, "test plugin", "0.1.0", "tests"),
                enabled: AtomicUsize::new(0),
                log: Arc::clone(log),
                fail_enable: true,
            })
        }
    }

    impl Plugin for Recorder {
        fn metadata(&self) -> &PluginMetadata {
            &self.metadata
        }

        fn on_enable(&self) -> PluginResult {
            if self.fail_enable {
                return Err("refused".into());
            }
            self.enabled.fetch_add(1, Ordering::SeqCst);
            self.log
                .lock()
                .unwrap()
                .push(format!("enable {}", self.metadata.name()));
            Ok(())
        }

        fn on_disable(&self) -> PluginResult {
            self.log
                .lock()
                .unwrap()
                .push(format!("disable {}", self.metadata.name()));
            Ok(())
        }
    }

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn register_then_lookup_by_name() {
        let registry = PluginRegistry::new();
        let plugin: Arc<dyn Plugin> = Recorder::new("welcome", &log());

        registry.register(Arc::clone(&plugin));

        let found = registry.get_by_name("welcome").unwrap();
        assert!(Arc::ptr_eq(&found, &plugin));
        assert!(registry.contains(&plugin));
    }

    #[test]
    fn unregister_removes_lookup() {
        let registry = PluginRegistry::new();
        let plugin: Arc<dyn Plugin> = Recorder::new("welcome", &log());

        registry.register(Arc::clone(&plugin));
        registry.unregister(&plugin);

        assert!(registry.get_by_name("welcome").is_none());
        assert!(!registry.contains(&plugin));
        assert!(registry.is_empty());
    }

    #[test]
    fn register_is_idempotent_per_instance() {
        let registry = PluginRegistry::new();
        let plugin: Arc<dyn Plugin> = Recorder::new("welcome", &log());

        registry.register(Arc::clone(&plugin));
        registry.register(Arc::clone(&plugin));

        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_absent_plugin_is_noop() {
        let registry = PluginRegistry::new();
        let kept: Arc<dyn Plugin> = Recorder::new("kept", &log());
        let stranger: Arc<dyn Plugin> = Recorder::new("stranger", &log());

        registry.register(Arc::clone(&kept));
        registry.unregister(&stranger);

        assert_eq!(registry.len(), 1);
        assert!(registry.contains(&kept));
    }

    #[test]
    fn shared_names_track_both_and_return_one() {
        let registry = PluginRegistry::new();
        let first: Arc<dyn Plugin> = Recorder::new("dup", &log());
        let second: Arc<dyn Plugin> = Recorder::new("dup", &log());

        registry.register(Arc::clone(&first));
        registry.register(Arc::clone(&second));

        assert_eq!(registry.len(), 2);
        let found = registry.get_by_name("dup").unwrap();
        assert!(Arc::ptr_eq(&found, &first));

        // Removing the first exposes the second under the same name
        registry.unregister(&first);
        let found = registry.get_by_name("dup").unwrap();
        assert!(Arc::ptr_eq(&found, &second));
    }

    #[test]
    fn lookup_is_case_sensitive() {
        let registry = PluginRegistry::new();
        registry.register(Recorder::new("Welcome", &log()));

        assert!(registry.get_by_name("welcome").is_none());
        assert!(registry.get_by_name("Welcome").is_some());
    }

    #[test]
    fn registry_does_not_invoke_callbacks() {
        let registry = PluginRegistry::new();
        let recorder = Recorder::new("quiet", &log());
        let plugin: Arc<dyn Plugin> = recorder.clone();

        registry.register(Arc::clone(&plugin));
        registry.unregister(&plugin);

        assert_eq!(recorder.enabled.load(Ordering::SeqCst), 0);
        assert!(recorder.log.lock().unwrap().is_empty());
    }

    #[test]
    fn enable_in_order_disable_in_reverse() {
        let events = log();
        let registry = PluginRegistry::new();
        registry.register(Recorder::new("a", &events));
        registry.register(Recorder::new("b", &events));

        registry.enable_all().unwrap();
        registry.disable_all().unwrap();

        assert_eq!(
            *events.lock().unwrap(),
            vec!["enable a", "enable b", "disable b", "disable a"]
        );
    }

    #[test]
    fn enable_failure_propagates_with_plugin_name() {
        let events = log();
        let registry = PluginRegistry::new();
        registry.register(Recorder::failing("broken", &events));
        registry.register(Recorder::new("after", &events));

        let err = registry.enable_all().unwrap_err();
        assert!(matches!(err, ManagerError::Plugin { ref name, .. } if name == "broken"));
        // Later plugins are not enabled after a failure
        assert!(events.lock().unwrap().is_empty());
    }
}
