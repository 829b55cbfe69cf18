//! One loaded plugin: its library plus the root object it produced.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::{Rc, Weak};

use chrono::{DateTime, Utc};
use ltg_plugin_api::{
    HostContext, PluginBridge, PluginInterface, PluginModulePtr, PluginPaneConfig,
    PluginSettingsConfig, RootPlugin,
};
use tracing::{debug, info, warn};

use crate::lease::{Leased, LeasedModule, LibraryLease};
use crate::library::{SharedLibrary, SystemLibrary};
use crate::loader::{PluginBox, PluginLoader, SymbolNames};

/// Shared owner of a plugin root object.
pub type PluginHandle = Rc<PluginBox<RootPlugin>>;

/// Non-owning reference to a plugin root object.
pub type PluginRef = Weak<PluginBox<RootPlugin>>;

/// Result of [`PluginInstance::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    LoadingSucceeded,
    LoadingFailed,
    NotAPlugin,
}

/// A mapped plugin library, unloaded when the last owner drops it.
struct MappedLibrary<L: SharedLibrary> {
    name: String,
    loader: RefCell<PluginLoader<RootPlugin, L>>,
}

impl<L: SharedLibrary> MappedLibrary<L> {
    fn new(name: &str, loader: PluginLoader<RootPlugin, L>) -> Self {
        Self {
            name: name.to_string(),
            loader: RefCell::new(loader),
        }
    }

    /// Keep the code mapped for the rest of the process.
    fn leak(&self) {
        self.loader.borrow_mut().leak_library();
    }
}

impl<L: SharedLibrary> Drop for MappedLibrary<L> {
    fn drop(&mut self) {
        let loader = self.loader.get_mut();
        if loader.is_valid() {
            loader.close_library();
            debug!(plugin = %self.name, "Plugin library unloaded");
        }
    }
}

/// A plugin library and the root object constructed from it.
///
/// Teardown order is fixed: the plugin's `unit()`, then its deleter, then the
/// library unload. The unload waits for every module, pane and settings
/// object handed out through this instance to be dropped. Dropping the
/// instance runs [`unit`](Self::unit).
pub struct PluginInstance<L: SharedLibrary = SystemLibrary> {
    name: String,
    path: PathBuf,
    plugin: Option<PluginHandle>,
    library: Option<Rc<MappedLibrary<L>>>,
    loaded_at: Option<DateTime<Utc>>,
}

impl<L: SharedLibrary> PluginInstance<L> {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            path: PathBuf::new(),
            plugin: None,
            library: None,
            loaded_at: None,
        }
    }

    /// Load the library at `path` and initialize the plugin it exports.
    ///
    /// Anything already held by this instance is torn down first.
    pub fn init(
        &mut self,
        name: &str,
        path: &Path,
        symbols: &SymbolNames,
        host: &HostContext,
    ) -> LoadOutcome {
        self.unit();
        self.name = name.to_string();
        self.path = path.to_path_buf();

        let mut loader = PluginLoader::<RootPlugin, L>::with_symbols(path, symbols.clone());
        if loader.open_library().is_err() {
            return LoadOutcome::LoadingFailed;
        }
        let instance = loader.instance();
        if !loader.is_a_plugin() {
            return LoadOutcome::NotAPlugin;
        }
        let library = Rc::new(MappedLibrary::new(name, loader));

        let Some(mut plugin) = instance else {
            return LoadOutcome::LoadingFailed;
        };

        let required = plugin.minimal_host_version();
        if required > host.host_version() {
            warn!(
                plugin = %self.name,
                required,
                host = host.host_version(),
                "Plugin requires a newer host version"
            );
            drop(plugin);
            return LoadOutcome::LoadingFailed;
        }

        if !plugin.init(host) {
            debug!(plugin = %self.name, "Plugin init refused");
            drop(plugin);
            return LoadOutcome::LoadingFailed;
        }

        self.plugin = Some(Rc::new(plugin));
        self.library = Some(library);
        self.loaded_at = Some(Utc::now());
        LoadOutcome::LoadingSucceeded
    }

    /// Tear the plugin down and release its library. Idempotent.
    ///
    /// Weak references from [`get`](Self::get) do not hold the plugin back.
    /// If an upgraded strong reference is still alive, the plugin cannot be
    /// torn down safely: its `unit()` is skipped and the library stays mapped
    /// for the rest of the process.
    pub fn unit(&mut self) {
        let library = self.library.take();
        match self.plugin.take().map(Rc::try_unwrap) {
            Some(Ok(mut plugin)) => {
                plugin.unit();
                drop(plugin);
                if let Some(library) = library {
                    self.release(library);
                }
                info!(plugin = %self.name, "Plugin unloaded");
            }
            Some(Err(shared)) => {
                drop(shared);
                warn!(
                    plugin = %self.name,
                    "Plugin still referenced on unload, leaking its library"
                );
                if let Some(library) = library {
                    library.leak();
                }
            }
            None => drop(library),
        }
        self.loaded_at = None;
    }

    fn release(&self, library: Rc<MappedLibrary<L>>) {
        let holders = Rc::strong_count(&library) - 1;
        if holders > 0 {
            info!(
                plugin = %self.name,
                holders,
                "Plugin library stays loaded until the objects it produced are dropped"
            );
        }
    }

    /// Weak reference to the root object; dangling when nothing is loaded.
    pub fn get(&self) -> PluginRef {
        self.plugin.as_ref().map(Rc::downgrade).unwrap_or_default()
    }

    /// Borrow the root object.
    ///
    /// Objects created directly through it are not tied to the library's
    /// lifetime; prefer [`create_module`](Self::create_module),
    /// [`panes`](Self::panes) and [`settings`](Self::settings).
    pub fn interface(&self) -> Option<&dyn PluginInterface> {
        let plugin: &RootPlugin = self.plugin.as_deref()?;
        Some(&**plugin)
    }

    /// Claim on the library, while a plugin is loaded.
    pub fn lease(&self) -> Option<LibraryLease> {
        self.library
            .as_ref()
            .map(|library| LibraryLease::new(Rc::clone(library)))
    }

    /// Create a module that keeps this plugin's library loaded while alive.
    pub fn create_module(
        &self,
        module_name: &str,
        bridge: &dyn PluginBridge,
    ) -> Option<PluginModulePtr> {
        let module = self.interface()?.create_module(module_name, bridge)?;
        let lease = self.lease()?;
        Some(LeasedModule::wrap(module, lease))
    }

    pub fn panes(&self) -> Vec<Leased<PluginPaneConfig>> {
        self.leased(|plugin| plugin.panes())
    }

    pub fn settings(&self) -> Vec<Leased<PluginSettingsConfig>> {
        self.leased(|plugin| plugin.settings())
    }

    fn leased<T>(&self, produce: impl FnOnce(&dyn PluginInterface) -> Vec<T>) -> Vec<Leased<T>> {
        let (Some(plugin), Some(lease)) = (self.interface(), self.lease()) else {
            return Vec::new();
        };
        produce(plugin)
            .into_iter()
            .map(|value| Leased::new(value, lease.clone()))
            .collect()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When the last successful [`init`](Self::init) completed.
    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.loaded_at
    }

    pub fn is_loaded(&self) -> bool {
        self.plugin.is_some()
    }
}

impl<L: SharedLibrary> Default for PluginInstance<L> {
    fn default() -> Self {
        Self::new()
    }
}

impl<L: SharedLibrary> Drop for PluginInstance<L> {
    fn drop(&mut self) {
        self.unit();
    }
}

impl<L: SharedLibrary> std::fmt::Debug for PluginInstance<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInstance")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("loaded", &self.is_loaded())
            .field("loaded_at", &self.loaded_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{journal, FakeLibrary, FakePluginSpec, FakeRegistry};
    use ltg_plugin_api::PluginModuleType;

    type Instance = PluginInstance<FakeLibrary>;

    fn host() -> HostContext {
        HostContext::new("/app").with_host_version(300)
    }

    fn init(instance: &mut Instance, file: &str) -> LoadOutcome {
        let name = Path::new(file)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap()
            .to_string();
        instance.init(&name, Path::new(file), &SymbolNames::default(), &host())
    }

    fn events(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_init_and_unit_order() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plugin(
            "plugin_lua.so",
            FakePluginSpec::new("Lua", &[("Lua", PluginModuleType::Scripting)]),
        );

        let mut instance = Instance::new();
        assert_eq!(init(&mut instance, "plugin_lua.so"), LoadOutcome::LoadingSucceeded);
        assert!(instance.is_loaded());
        assert!(instance.loaded_at().is_some());
        assert_eq!(instance.name(), "plugin_lua");
        assert_eq!(instance.interface().unwrap().name(), "Lua");

        instance.unit();
        assert!(!instance.is_loaded());
        assert!(instance.loaded_at().is_none());
        assert_eq!(
            journal(),
            events(&["init:Lua", "unit:Lua", "delete:Lua", "close:plugin_lua.so"])
        );

        // second unit is a no-op
        instance.unit();
        assert_eq!(journal().len(), 4);
    }

    #[test]
    fn test_drop_runs_unit() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plugin("plugin_lua.so", FakePluginSpec::new("Lua", &[]));

        let mut instance = Instance::new();
        init(&mut instance, "plugin_lua.so");
        drop(instance);

        assert_eq!(
            journal(),
            events(&["init:Lua", "unit:Lua", "delete:Lua", "close:plugin_lua.so"])
        );
    }

    #[test]
    fn test_not_a_plugin() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plain("plugin_curl.so", &["curl_easy_init"]);

        let mut instance = Instance::new();
        assert_eq!(init(&mut instance, "plugin_curl.so"), LoadOutcome::NotAPlugin);
        assert!(!instance.is_loaded());
        assert_eq!(journal(), events(&["close:plugin_curl.so"]));
    }

    #[test]
    fn test_missing_file_fails() {
        let _guard = FakeRegistry::install();

        let mut instance = Instance::new();
        assert_eq!(init(&mut instance, "plugin_gone.so"), LoadOutcome::LoadingFailed);
        assert!(!instance.is_loaded());
    }

    #[test]
    fn test_failed_init_is_deleted_without_unit() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plugin("plugin_bad.so", FakePluginSpec::new("Bad", &[]).failing_init());

        let mut instance = Instance::new();
        assert_eq!(init(&mut instance, "plugin_bad.so"), LoadOutcome::LoadingFailed);
        assert!(!instance.is_loaded());
        assert_eq!(
            journal(),
            events(&["init:Bad", "delete:Bad", "close:plugin_bad.so"])
        );
    }

    #[test]
    fn test_newer_host_required() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plugin(
            "plugin_future.so",
            FakePluginSpec::new("Future", &[]).requiring_host(10_000),
        );

        let mut instance = Instance::new();
        assert_eq!(init(&mut instance, "plugin_future.so"), LoadOutcome::LoadingFailed);
        assert_eq!(journal(), events(&["delete:Future", "close:plugin_future.so"]));
    }

    #[test]
    fn test_null_instance_fails() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plugin(
            "plugin_null.so",
            FakePluginSpec::new("Null", &[]).null_instance(),
        );

        let mut instance = Instance::new();
        assert_eq!(init(&mut instance, "plugin_null.so"), LoadOutcome::LoadingFailed);
        assert_eq!(journal(), events(&["close:plugin_null.so"]));
    }

    #[test]
    fn test_get_returns_weak_reference() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plugin("plugin_lua.so", FakePluginSpec::new("Lua", &[]));

        let mut instance = Instance::new();
        assert!(instance.get().upgrade().is_none());

        init(&mut instance, "plugin_lua.so");
        let weak = instance.get();
        assert_eq!(weak.upgrade().unwrap().description(), "Lua plugin");

        instance.unit();
        assert!(weak.upgrade().is_none());
        assert_eq!(
            journal(),
            events(&["init:Lua", "unit:Lua", "delete:Lua", "close:plugin_lua.so"])
        );
    }

    struct NoBridge;

    impl PluginBridge for NoBridge {
        fn indicator(&self, _name: &str) -> Option<ltg_plugin_api::IndicatorComputingPtr> {
            None
        }
    }

    #[test]
    fn test_module_keeps_library_loaded() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plugin(
            "plugin_sma.so",
            FakePluginSpec::new("Sma", &[("Sma", PluginModuleType::Indicator)]),
        );

        let mut instance = Instance::new();
        init(&mut instance, "plugin_sma.so");
        let module = instance.create_module("Sma", &NoBridge).unwrap();
        assert!(instance.create_module("Ema", &NoBridge).is_none());

        instance.unit();
        assert_eq!(journal(), events(&["init:Sma", "unit:Sma", "delete:Sma"]));

        // still callable, the code is mapped
        let indicator = module.into_indicator().unwrap();
        assert_eq!(indicator.compute(&[1.0], &[]), Some(vec![1.0]));
        assert_eq!(journal().len(), 3);

        drop(indicator);
        assert_eq!(
            journal(),
            events(&["init:Sma", "unit:Sma", "delete:Sma", "close:plugin_sma.so"])
        );
    }

    #[test]
    fn test_panes_and_settings_keep_library_loaded() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plugin("plugin_lua.so", FakePluginSpec::new("Lua", &[]));

        let mut instance = Instance::new();
        init(&mut instance, "plugin_lua.so");
        let panes = instance.panes();
        let settings = instance.settings();
        assert_eq!(panes[0].name, "Lua pane");
        assert_eq!(panes[0].lease().holders(), 3);

        drop(instance);
        assert_eq!(journal(), events(&["init:Lua", "unit:Lua", "delete:Lua"]));
        assert!(settings[0].settings.upgrade().is_none());

        drop(panes);
        assert_eq!(journal().len(), 3);
        drop(settings);
        assert_eq!(
            journal(),
            events(&["init:Lua", "unit:Lua", "delete:Lua", "close:plugin_lua.so"])
        );
    }

    #[test]
    fn test_nothing_leased_when_unloaded() {
        let instance = Instance::new();
        assert!(instance.lease().is_none());
        assert!(instance.panes().is_empty());
        assert!(instance.settings().is_empty());
        assert!(instance.create_module("Lua", &NoBridge).is_none());
    }

    #[test]
    fn test_outstanding_reference_leaks_library() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plugin("plugin_lua.so", FakePluginSpec::new("Lua", &[]));

        let mut instance = Instance::new();
        init(&mut instance, "plugin_lua.so");
        let strong = instance.get().upgrade().unwrap();

        instance.unit();
        assert!(!instance.is_loaded());
        assert_eq!(journal(), events(&["init:Lua"]));

        drop(strong);
        assert_eq!(journal(), events(&["init:Lua", "delete:Lua"]));
    }

    #[test]
    fn test_reinit_tears_down_previous() {
        let _guard = FakeRegistry::install();
        FakeRegistry::add_plugin("plugin_a.so", FakePluginSpec::new("A", &[]));
        FakeRegistry::add_plugin("plugin_b.so", FakePluginSpec::new("B", &[]));

        let mut instance = Instance::new();
        init(&mut instance, "plugin_a.so");
        init(&mut instance, "plugin_b.so");

        assert_eq!(instance.name(), "plugin_b");
        assert_eq!(
            journal(),
            events(&["init:A", "unit:A", "delete:A", "close:plugin_a.so", "init:B"])
        );
    }
}
