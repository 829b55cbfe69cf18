//! Plugin manager.
//!
//! Discovers plugin libraries under the application's plugin directory,
//! keeps the loaded ones in a registry keyed by name, and aggregates what
//! they provide for the host. It is also the [`PluginBridge`] handed to
//! module factories, so modules of one plugin can use indicators of another.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ltg_plugin_api::{
    HostContext, IndicatorComputingPtr, PluginBridge, PluginInterface, PluginModuleInfos,
    PluginModulePtr, PluginModuleType, PluginPaneConfig, PluginSettingsConfig,
};
use tracing::{debug, error, info, warn};

use crate::config::{DuplicatePolicy, PluginManagerConfig};
use crate::error::{PluginError, Result};
use crate::instance::{LoadOutcome, PluginInstance, PluginRef};
use crate::lease::Leased;
use crate::library::{SharedLibrary, SystemLibrary};

/// What happened during one [`PluginManager::load_plugins`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    /// Names registered by this call.
    pub loaded: Vec<String>,
    /// Names whose library or plugin failed to load or initialize.
    pub failed: Vec<String>,
    /// Candidate files that do not export the plugin factories.
    pub not_plugins: Vec<PathBuf>,
    /// Names loaded and then dropped by the module type filter.
    pub filtered_out: Vec<String>,
    /// Names seen more than once.
    pub duplicates: Vec<String>,
}

/// Registry of loaded plugins.
///
/// Holds `Rc` handles and is confined to one thread.
pub struct PluginManager<L: SharedLibrary = SystemLibrary> {
    config: PluginManagerConfig,
    plugins: BTreeMap<String, PluginInstance<L>>,
}

impl PluginManager {
    /// Manager backed by the operating system's dynamic loader.
    pub fn new(config: PluginManagerConfig) -> Self {
        Self::with_backend(config)
    }
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new(PluginManagerConfig::default())
    }
}

impl<L: SharedLibrary> PluginManager<L> {
    /// Manager backed by an arbitrary library implementation.
    pub fn with_backend(config: PluginManagerConfig) -> Self {
        Self {
            config,
            plugins: BTreeMap::new(),
        }
    }

    pub fn config(&self) -> &PluginManagerConfig {
        &self.config
    }

    /// Scan `app_path/<plugin_dir>` recursively and load every candidate.
    ///
    /// With a non-empty `types_to_load`, a plugin is kept only if it declares
    /// at least one module of a listed type. Failures are logged and recorded
    /// in the report; they never stop the scan.
    pub fn load_plugins(
        &mut self,
        app_path: impl AsRef<Path>,
        types_to_load: &[PluginModuleType],
    ) -> LoadReport {
        let app_path = app_path.as_ref();
        let plugin_dir = app_path.join(&self.config.plugin_dir);
        let mut report = LoadReport::default();

        if !plugin_dir.is_dir() {
            info!(dir = %plugin_dir.display(), "Plugin directory not found, no plugins loaded");
            return report;
        }

        info!(dir = %plugin_dir.display(), "Loading plugins");
        let host = HostContext::new(app_path).with_host_version(self.config.host_version);
        self.scan_directory(&plugin_dir, types_to_load, &host, &mut report);
        self.display_loaded_plugins();
        report
    }

    fn scan_directory(
        &mut self,
        dir: &Path,
        types_to_load: &[PluginModuleType],
        host: &HostContext,
        report: &mut LoadReport,
    ) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Can't read plugin directory");
                return;
            }
        };

        // sorted so that duplicate resolution does not depend on the OS
        let mut entries: Vec<_> = entries
            .flatten()
            .filter_map(|entry| Some((entry.path(), entry.file_type().ok()?)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, file_type) in entries {
            if file_type.is_dir() {
                self.scan_directory(&path, types_to_load, host, report);
            } else if path.is_file() && self.config.is_candidate(&path) {
                self.load_plugin(&path, types_to_load, host, report);
            }
        }
    }

    fn load_plugin(
        &mut self,
        path: &Path,
        types_to_load: &[PluginModuleType],
        host: &HostContext,
        report: &mut LoadReport,
    ) {
        let Some(name) = path.file_stem().and_then(|s| s.to_str()).map(str::to_owned) else {
            return;
        };

        if self.config.duplicate_policy == DuplicatePolicy::Reject {
            if let Some(existing) = self.plugins.get(&name) {
                let err = PluginError::DuplicateName {
                    name: name.clone(),
                    existing: existing.path().to_path_buf(),
                    rejected: path.to_path_buf(),
                };
                warn!(plugin = %name, "{}", err);
                report.duplicates.push(name);
                return;
            }
        }

        let mut instance = PluginInstance::<L>::new();
        match instance.init(&name, path, &self.config.symbol_names(), host) {
            LoadOutcome::LoadingSucceeded => {}
            LoadOutcome::NotAPlugin => {
                debug!(path = %path.display(), "Not a plugin, skipped");
                report.not_plugins.push(path.to_path_buf());
                return;
            }
            LoadOutcome::LoadingFailed => {
                warn!(plugin = %name, path = %path.display(), "Plugin loading failed");
                report.failed.push(name);
                return;
            }
        }

        if !Self::is_authorized(&instance, types_to_load) {
            debug!(plugin = %name, "Plugin excluded by module type filter");
            report.filtered_out.push(name);
            return;
        }

        if let Some(previous) = self.plugins.remove(&name) {
            warn!(
                plugin = %name,
                previous = %previous.path().display(),
                replacement = %path.display(),
                "Duplicate plugin name, replacing the previous one"
            );
            drop(previous);
            report.duplicates.push(name.clone());
            report.loaded.retain(|n| n != &name);
        }

        report.loaded.push(name.clone());
        self.plugins.insert(name, instance);
    }

    fn is_authorized(instance: &PluginInstance<L>, types_to_load: &[PluginModuleType]) -> bool {
        if types_to_load.is_empty() {
            return true;
        }
        instance.interface().is_some_and(|plugin| {
            plugin
                .modules_infos()
                .iter()
                .any(|infos| types_to_load.contains(&infos.module_type))
        })
    }

    /// Column-aligned `name  vversion  (description)` line per plugin.
    pub fn summary_lines(&self) -> Vec<String> {
        const MINIMAL_SPACE: usize = 2;

        let rows: Vec<(String, String, String)> = self
            .interfaces()
            .map(|p| (p.name(), p.version(), p.description()))
            .collect();
        let name_width =
            rows.iter().map(|r| r.0.chars().count()).max().unwrap_or(0) + MINIMAL_SPACE;
        let version_width =
            rows.iter().map(|r| r.1.chars().count()).max().unwrap_or(0) + MINIMAL_SPACE;

        rows.iter()
            .map(|(name, version, description)| {
                format!("{name:<name_width$}v{version:<version_width$}({description})")
            })
            .collect()
    }

    fn display_loaded_plugins(&self) {
        if self.plugins.is_empty() {
            info!("No plugins loaded");
            return;
        }
        for line in self.summary_lines() {
            info!("Plugin loaded : {}", line);
        }
    }

    /// Tear down and forget every plugin. Safe to call repeatedly.
    pub fn unload_plugins(&mut self) {
        if !self.plugins.is_empty() {
            info!(count = self.plugins.len(), "Unloading plugins");
        }
        self.plugins.clear();
    }

    /// Tear down one plugin by registry name.
    pub fn unload_plugin(&mut self, name: &str) -> Result<()> {
        self.plugins
            .remove(name)
            .map(drop)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    fn interfaces(&self) -> impl Iterator<Item = &dyn PluginInterface> + '_ {
        self.plugins.values().filter_map(|instance| instance.interface())
    }

    /// Module descriptors of every plugin, in registry order.
    pub fn plugin_modules_infos(&self) -> Vec<PluginModuleInfos> {
        self.interfaces().flat_map(|p| p.modules_infos()).collect()
    }

    /// Panes of every plugin. Each keeps its plugin's library loaded.
    pub fn plugin_panes(&self) -> Vec<Leased<PluginPaneConfig>> {
        self.plugins.values().flat_map(PluginInstance::panes).collect()
    }

    /// Settings objects of every plugin. Each keeps its plugin's library loaded.
    pub fn plugin_settings(&self) -> Vec<Leased<PluginSettingsConfig>> {
        self.plugins
            .values()
            .flat_map(PluginInstance::settings)
            .collect()
    }

    /// First module named `module_name` any plugin can create, in registry
    /// order. The module keeps its plugin's library loaded, even across
    /// [`unload_plugins`](Self::unload_plugins).
    pub fn create_plugin_module(&self, module_name: &str) -> Option<PluginModulePtr> {
        if module_name.is_empty() {
            return None;
        }
        self.plugins
            .values()
            .find_map(|instance| instance.create_module(module_name, self))
    }

    /// Create `module_name` from the plugin registered as `plugin_name` only.
    pub fn create_plugin_module_in(
        &self,
        plugin_name: &str,
        module_name: &str,
    ) -> Option<PluginModulePtr> {
        if module_name.is_empty() {
            return None;
        }
        self.plugins
            .get(plugin_name)?
            .create_module(module_name, self)
    }

    /// Weak reference to a registered plugin's root object.
    pub fn get(&self, name: &str) -> Option<PluginRef> {
        self.plugins.get(name).map(PluginInstance::get)
    }

    /// Registered names, in registry order.
    pub fn plugin_names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

impl<L: SharedLibrary> PluginBridge for PluginManager<L> {
    fn indicator(&self, name: &str) -> Option<IndicatorComputingPtr> {
        let module = self.create_plugin_module(name)?;
        let indicator = module.into_indicator();
        if indicator.is_none() {
            error!(module = name, "Module is not an indicator");
        }
        indicator
    }
}

impl<L: SharedLibrary> std::fmt::Debug for PluginManager<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginManager")
            .field("config", &self.config)
            .field("plugins", &self.plugins)
            .finish()
    }
}
