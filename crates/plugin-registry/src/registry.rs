use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use libloading::Library;
use regime_core::{Config, ConfigSchema, EngineError, EngineResult};

use crate::plugin::{Plugin, PluginInfo, PluginState};

/// ABI version every dynamically loaded plugin must present verbatim.
pub const ABI_VERSION: &str = "regimeflow-abi-1";

/// Required exported symbols. `create_plugin` hands over an owning
/// double-boxed trait object so the fat pointer never crosses the C ABI.
pub type CreatePluginFn = unsafe extern "C" fn() -> *mut Box<dyn Plugin>;
pub type DestroyPluginFn = unsafe extern "C" fn(*mut Box<dyn Plugin>);
pub type AbiStrFn = unsafe extern "C" fn() -> *const c_char;

pub type PluginFactory = Arc<dyn Fn() -> Box<dyn Plugin> + Send + Sync>;

struct DynamicRecord {
    // Held to keep the library mapped while its plugins can be created.
    _library: Library,
    plugin_type: String,
}

#[derive(Default)]
struct RegistryInner {
    factories: HashMap<String, HashMap<String, PluginFactory>>,
    dynamic_plugins: HashMap<String, DynamicRecord>,
}

/// Process-wide plugin registry: static factories plus dynamically loaded
/// libraries, keyed by (plugin type, plugin name). All operations are
/// mutex-guarded; factories may be registered from any thread.
#[derive(Default)]
pub struct PluginRegistry {
    inner: Mutex<RegistryInner>,
}

/// Access the lazily initialized process-wide registry.
pub fn registry() -> &'static PluginRegistry {
    static REGISTRY: OnceLock<PluginRegistry> = OnceLock::new();
    REGISTRY.get_or_init(PluginRegistry::default)
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false iff a factory is already registered under
    /// `(plugin_type, name)`.
    pub fn register_factory(
        &self,
        plugin_type: &str,
        name: &str,
        factory: PluginFactory,
    ) -> bool {
        let mut inner = self.inner.lock().expect("registry lock");
        let type_map = inner.factories.entry(plugin_type.to_string()).or_default();
        if type_map.contains_key(name) {
            return false;
        }
        type_map.insert(name.to_string(), factory);
        true
    }

    fn factory(&self, plugin_type: &str, name: &str) -> Option<PluginFactory> {
        let inner = self.inner.lock().expect("registry lock");
        inner.factories.get(plugin_type)?.get(name).cloned()
    }

    /// Construct and initialize a plugin.
    ///
    /// Runs `on_load`, applies schema defaults and validation when the
    /// plugin exposes a schema, then `on_initialize`. Any failure leaves
    /// the plugin in `Error` state and yields `None`. The returned handle
    /// stops the plugin on drop if it is still active.
    pub fn create(&self, plugin_type: &str, name: &str, config: &Config) -> Option<PluginHandle> {
        let factory = self.factory(plugin_type, name)?;
        let mut plugin = factory();

        if let Err(error) = plugin.on_load() {
            tracing::warn!(plugin_type, name, %error, "plugin on_load failed");
            return None;
        }
        plugin.set_state(PluginState::Loaded);

        let effective = match plugin.config_schema() {
            Some(schema) => {
                let filled = schema.apply_defaults(config);
                if let Err(error) = schema.validate(&filled) {
                    tracing::warn!(plugin_type, name, %error, "plugin config rejected by schema");
                    plugin.set_state(PluginState::Error);
                    return None;
                }
                filled
            }
            None => config.clone(),
        };

        if let Err(error) = plugin.on_initialize(&effective) {
            tracing::warn!(plugin_type, name, %error, "plugin on_initialize failed");
            plugin.set_state(PluginState::Error);
            return None;
        }
        plugin.set_state(PluginState::Initialized);
        Some(PluginHandle::new(plugin))
    }

    pub fn list_types(&self) -> Vec<String> {
        let inner = self.inner.lock().expect("registry lock");
        let mut types: Vec<String> = inner.factories.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn list_plugins(&self, plugin_type: &str) -> Vec<String> {
        let inner = self.inner.lock().expect("registry lock");
        let mut names: Vec<String> = inner
            .factories
            .get(plugin_type)
            .map(|m| m.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn get_info(&self, plugin_type: &str, name: &str) -> Option<PluginInfo> {
        let factory = self.factory(plugin_type, name)?;
        Some(factory().info())
    }

    /// Load a shared library exposing the plugin ABI and register its
    /// factory.
    pub fn load_dynamic_plugin(&self, path: &Path) -> EngineResult<()> {
        let library = unsafe { Library::new(path) }
            .map_err(|_| EngineError::io("Failed to load plugin library"))?;

        let create_fn: CreatePluginFn = unsafe {
            *library
                .get::<CreatePluginFn>(b"create_plugin\0")
                .map_err(|_| {
                    EngineError::invalid_state("Plugin missing create/destroy entry points")
                })?
        };
        let destroy_fn: DestroyPluginFn = unsafe {
            *library
                .get::<DestroyPluginFn>(b"destroy_plugin\0")
                .map_err(|_| {
                    EngineError::invalid_state("Plugin missing create/destroy entry points")
                })?
        };

        let read_str = |symbol: &[u8]| -> Option<String> {
            let f: AbiStrFn = unsafe { *library.get::<AbiStrFn>(symbol).ok()? };
            let raw = unsafe { f() };
            if raw.is_null() {
                return None;
            }
            Some(unsafe { CStr::from_ptr(raw) }.to_string_lossy().into_owned())
        };

        match read_str(b"regimeflow_abi_version\0") {
            Some(version) if version == ABI_VERSION => {}
            _ => {
                return Err(EngineError::invalid_state("Plugin ABI version mismatch"));
            }
        }

        // Probe one instance for metadata before registering anything.
        let probe_raw = unsafe { create_fn() };
        if probe_raw.is_null() {
            return Err(EngineError::invalid_state("Plugin creation failed"));
        }
        let probe_info = unsafe { (*probe_raw).info() };
        unsafe { destroy_fn(probe_raw) };

        let plugin_name = read_str(b"plugin_name\0").unwrap_or(probe_info.name);
        let plugin_type = read_str(b"plugin_type\0").unwrap_or_else(|| "dynamic".to_string());
        if plugin_name.is_empty() {
            return Err(EngineError::invalid_argument("Plugin has no name"));
        }

        let mut inner = self.inner.lock().expect("registry lock");
        if inner.dynamic_plugins.contains_key(&plugin_name) {
            return Err(EngineError::already_exists("Plugin already loaded"));
        }
        let factory: PluginFactory = Arc::new(move || {
            Box::new(DynamicPluginHandle {
                raw: unsafe { create_fn() },
                destroy: destroy_fn,
            }) as Box<dyn Plugin>
        });
        inner
            .factories
            .entry(plugin_type.clone())
            .or_default()
            .insert(plugin_name.clone(), factory);
        inner.dynamic_plugins.insert(
            plugin_name.clone(),
            DynamicRecord {
                _library: library,
                plugin_type: plugin_type.clone(),
            },
        );
        tracing::info!(plugin_type, name = plugin_name, "loaded dynamic plugin");
        Ok(())
    }

    /// Remove a dynamic plugin's factory and close its library.
    pub fn unload_dynamic_plugin(&self, name: &str) -> EngineResult<()> {
        let record = {
            let mut inner = self.inner.lock().expect("registry lock");
            let Some(record) = inner.dynamic_plugins.remove(name) else {
                return Err(EngineError::not_found("Plugin not loaded"));
            };
            if let Some(type_map) = inner.factories.get_mut(&record.plugin_type) {
                type_map.remove(name);
                if type_map.is_empty() {
                    inner.factories.remove(&record.plugin_type);
                }
            }
            record
        };
        drop(record);
        tracing::info!(name, "unloaded dynamic plugin");
        Ok(())
    }

    /// Attempt to load every shared library in a directory; the extension
    /// match is platform-dependent.
    pub fn scan_plugin_directory(&self, path: &Path) {
        let Ok(entries) = std::fs::read_dir(path) else {
            return;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
            let is_plugin = if cfg!(target_os = "windows") {
                extension == "dll"
            } else if cfg!(target_os = "macos") {
                extension == "dylib" || extension == "so"
            } else {
                extension == "so"
            };
            if !is_plugin {
                continue;
            }
            if let Err(error) = self.load_dynamic_plugin(&path) {
                tracing::warn!(path = %path.display(), %error, "failed to load plugin");
            }
        }
    }

    /// Start a plugin, transitioning to `Active` or `Error`.
    pub fn start_plugin(&self, plugin: &mut dyn Plugin) -> EngineResult<()> {
        if let Err(error) = plugin.on_start() {
            plugin.set_state(PluginState::Error);
            return Err(error);
        }
        plugin.set_state(PluginState::Active);
        Ok(())
    }

    /// Stop a plugin, transitioning to `Stopped` or `Error`.
    pub fn stop_plugin(&self, plugin: &mut dyn Plugin) -> EngineResult<()> {
        if let Err(error) = plugin.on_stop() {
            plugin.set_state(PluginState::Error);
            return Err(error);
        }
        plugin.set_state(PluginState::Stopped);
        Ok(())
    }
}

/// Owning handle over an initialized plugin.
///
/// Dropping the handle while the plugin is `Active` stops it first, so a
/// holder can never leak a running plugin.
pub struct PluginHandle {
    inner: Box<dyn Plugin>,
}

impl PluginHandle {
    fn new(inner: Box<dyn Plugin>) -> Self {
        Self { inner }
    }
}

impl std::ops::Deref for PluginHandle {
    type Target = dyn Plugin;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl std::ops::DerefMut for PluginHandle {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.inner.as_mut()
    }
}

impl Drop for PluginHandle {
    fn drop(&mut self) {
        if self.inner.state() == PluginState::Active {
            match self.inner.on_stop() {
                Ok(()) => self.inner.set_state(PluginState::Stopped),
                Err(error) => {
                    tracing::warn!(%error, "plugin on_stop failed during drop");
                    self.inner.set_state(PluginState::Error);
                }
            }
        }
    }
}

/// Owning handle over a dynamically created plugin; destruction goes back
/// through the library's `destroy_plugin`.
struct DynamicPluginHandle {
    raw: *mut Box<dyn Plugin>,
    destroy: DestroyPluginFn,
}

// The handle owns the instance exclusively; the raw pointer never aliases.
unsafe impl Send for DynamicPluginHandle {}

impl DynamicPluginHandle {
    fn plugin(&self) -> &dyn Plugin {
        unsafe { (*self.raw).as_ref() }
    }

    fn plugin_mut(&mut self) -> &mut dyn Plugin {
        unsafe { (*self.raw).as_mut() }
    }
}

impl Plugin for DynamicPluginHandle {
    fn info(&self) -> PluginInfo {
        self.plugin().info()
    }

    fn state(&self) -> PluginState {
        self.plugin().state()
    }

    fn set_state(&mut self, state: PluginState) {
        self.plugin_mut().set_state(state);
    }

    fn config_schema(&self) -> Option<ConfigSchema> {
        self.plugin().config_schema()
    }

    fn on_load(&mut self) -> EngineResult<()> {
        self.plugin_mut().on_load()
    }

    fn on_initialize(&mut self, config: &Config) -> EngineResult<()> {
        self.plugin_mut().on_initialize(config)
    }

    fn on_start(&mut self) -> EngineResult<()> {
        self.plugin_mut().on_start()
    }

    fn on_stop(&mut self) -> EngineResult<()> {
        self.plugin_mut().on_stop()
    }

    fn create_artifact(&mut self) -> Option<crate::plugin::PluginArtifact> {
        self.plugin_mut().create_artifact()
    }
}

impl Drop for DynamicPluginHandle {
    fn drop(&mut self) {
        if !self.raw.is_null() {
            unsafe { (self.destroy)(self.raw) };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::PluginArtifact;
    use regime_core::{RegimeType, SchemaField, SchemaKind};
    use regime_detector::ConstantDetector;
    use serde_json::json;

    /// Minimal in-process detector plugin used across the tests.
    struct TestDetectorPlugin {
        state: PluginState,
        regime: RegimeType,
        fail_initialize: bool,
    }

    impl TestDetectorPlugin {
        fn new() -> Self {
            Self {
                state: PluginState::Unloaded,
                regime: RegimeType::Neutral,
                fail_initialize: false,
            }
        }
    }

    impl Plugin for TestDetectorPlugin {
        fn info(&self) -> PluginInfo {
            PluginInfo {
                name: "test_detector".to_string(),
                version: "0.1.0".to_string(),
                description: "constant regime detector".to_string(),
                author: "tests".to_string(),
                dependencies: Vec::new(),
            }
        }

        fn state(&self) -> PluginState {
            self.state
        }

        fn set_state(&mut self, state: PluginState) {
            self.state = state;
        }

        fn config_schema(&self) -> Option<ConfigSchema> {
            Some(ConfigSchema::new(vec![SchemaField::optional(
                "regime",
                SchemaKind::String,
                Some(json!("neutral")),
            )]))
        }

        fn on_initialize(&mut self, config: &Config) -> EngineResult<()> {
            if self.fail_initialize {
                return Err(EngineError::invalid_state("initialize failed"));
            }
            self.regime = config
                .get_str("regime")
                .and_then(RegimeType::parse_label)
                .unwrap_or(RegimeType::Neutral);
            Ok(())
        }

        fn create_artifact(&mut self) -> Option<PluginArtifact> {
            Some(PluginArtifact::Detector(Box::new(ConstantDetector::new(
                self.regime,
            ))))
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let registry = PluginRegistry::new();
        let factory: PluginFactory = Arc::new(|| Box::new(TestDetectorPlugin::new()));

        assert!(registry.register_factory("regime_detector", "test", factory.clone()));
        assert!(!registry.register_factory("regime_detector", "test", factory));
    }

    #[test]
    fn create_runs_lifecycle_and_applies_schema_defaults() {
        let registry = PluginRegistry::new();
        registry.register_factory(
            "regime_detector",
            "test",
            Arc::new(|| Box::new(TestDetectorPlugin::new())),
        );

        let plugin = registry
            .create("regime_detector", "test", &Config::new())
            .expect("plugin created");
        assert_eq!(plugin.state(), PluginState::Initialized);
    }

    #[test]
    fn schema_mismatch_yields_none() {
        let registry = PluginRegistry::new();
        registry.register_factory(
            "regime_detector",
            "test",
            Arc::new(|| Box::new(TestDetectorPlugin::new())),
        );

        let bad = Config::from_value(json!({ "regime": 42 }));
        assert!(registry.create("regime_detector", "test", &bad).is_none());
    }

    #[test]
    fn initialize_failure_yields_none() {
        let registry = PluginRegistry::new();
        registry.register_factory(
            "regime_detector",
            "failing",
            Arc::new(|| {
                let mut plugin = TestDetectorPlugin::new();
                plugin.fail_initialize = true;
                Box::new(plugin)
            }),
        );
        assert!(registry
            .create("regime_detector", "failing", &Config::new())
            .is_none());
    }

    #[test]
    fn artifact_carries_configured_detector() {
        let registry = PluginRegistry::new();
        registry.register_factory(
            "regime_detector",
            "test",
            Arc::new(|| Box::new(TestDetectorPlugin::new())),
        );

        use chrono::TimeZone;
        use regime_detector::RegimeDetector as _;

        let config = Config::from_value(json!({ "regime": "bear" }));
        let mut plugin = registry.create("regime_detector", "test", &config).unwrap();
        let Some(PluginArtifact::Detector(mut detector)) = plugin.create_artifact() else {
            panic!("expected detector artifact");
        };
        let bar = regime_core::Bar::flat(chrono::Utc.timestamp_opt(0, 0).unwrap(), "TST", 100.0, 1.0);
        assert_eq!(detector.on_bar(&bar).regime, RegimeType::Bear);
    }

    #[test]
    fn start_and_stop_advance_state() {
        let registry = PluginRegistry::new();
        registry.register_factory(
            "regime_detector",
            "test",
            Arc::new(|| Box::new(TestDetectorPlugin::new())),
        );
        let mut plugin = registry
            .create("regime_detector", "test", &Config::new())
            .unwrap();

        registry.start_plugin(&mut *plugin).unwrap();
        assert_eq!(plugin.state(), PluginState::Active);

        registry.stop_plugin(&mut *plugin).unwrap();
        assert_eq!(plugin.state(), PluginState::Stopped);
    }

    #[test]
    fn listings_are_sorted_and_scoped_by_type() {
        let registry = PluginRegistry::new();
        registry.register_factory(
            "regime_detector",
            "zeta",
            Arc::new(|| Box::new(TestDetectorPlugin::new())),
        );
        registry.register_factory(
            "regime_detector",
            "alpha",
            Arc::new(|| Box::new(TestDetectorPlugin::new())),
        );

        assert_eq!(registry.list_types(), vec!["regime_detector"]);
        assert_eq!(registry.list_plugins("regime_detector"), vec!["alpha", "zeta"]);
        assert!(registry.list_plugins("strategy").is_empty());

        let info = registry.get_info("regime_detector", "alpha").unwrap();
        assert_eq!(info.name, "test_detector");
    }

    #[test]
    fn missing_library_is_io_error() {
        let registry = PluginRegistry::new();
        let error = registry
            .load_dynamic_plugin(Path::new("/nonexistent/libplugin.so"))
            .unwrap_err();
        assert_eq!(error.kind(), "io_error");
    }

    #[test]
    fn unload_unknown_plugin_is_not_found() {
        let registry = PluginRegistry::new();
        let error = registry.unload_dynamic_plugin("ghost").unwrap_err();
        assert_eq!(error.kind(), "not_found");
    }

    #[test]
    fn scanning_missing_directory_is_a_no_op() {
        let registry = PluginRegistry::new();
        registry.scan_plugin_directory(Path::new("/nonexistent/plugins"));
        assert!(registry.list_types().is_empty());
    }

    #[test]
    fn scanning_skips_non_library_files() {
        let registry = PluginRegistry::new();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not a plugin").unwrap();
        registry.scan_plugin_directory(dir.path());
        assert!(registry.list_types().is_empty());
    }
}
