//! Traits implemented on either side of the library boundary.

use std::rc::Rc;

use crate::host::HostContext;
use crate::types::{
    PluginModuleInfos, PluginPaneConfig, PluginParam, PluginSettingsConfig, Serie, SettingsType,
};

/// Shared handle to a module created by a plugin.
pub type PluginModulePtr = Rc<dyn PluginModule>;

/// Shared handle to a module able to compute an indicator.
pub type IndicatorComputingPtr = Rc<dyn IndicatorComputing>;

/// Root interface every plugin library exposes through its `allocator` symbol.
///
/// Only `init` and `unit` get exclusive access: the host calls them while it is
/// the sole owner of the object. Everything else is reached through shared
/// references, so plugins keep mutable state behind `Cell`/`RefCell`.
pub trait PluginInterface {
    /// Initialize the plugin. Return `false` to refuse loading.
    ///
    /// The host context carries the host's logging dispatcher; plugins should
    /// install it so their diagnostics end up in the host's output.
    fn init(&mut self, host: &HostContext) -> bool;

    /// Release everything the plugin owns. Called while the library is still
    /// mapped, right before the object is handed to `deleter`.
    fn unit(&mut self);

    /// Oldest host version (see [`crate::HOST_VERSION`]) this plugin runs on.
    fn minimal_host_version(&self) -> u32 {
        0
    }

    fn version_major(&self) -> u32 {
        0
    }

    fn version_minor(&self) -> u32 {
        0
    }

    fn version_build(&self) -> u32 {
        0
    }

    fn name(&self) -> String;

    fn author(&self) -> String;

    /// Human readable version string, e.g. `"1.2.345"`.
    fn version(&self) -> String;

    fn contact(&self) -> String {
        String::new()
    }

    fn description(&self) -> String;

    /// Modules this plugin can create.
    fn modules_infos(&self) -> Vec<PluginModuleInfos>;

    /// Create the module named `module_name`, or `None` if this plugin does not
    /// provide it.
    ///
    /// The bridge is only valid for the duration of the call.
    fn create_module(
        &self,
        module_name: &str,
        bridge: &dyn PluginBridge,
    ) -> Option<PluginModulePtr>;

    /// Panes to register in the host layout.
    fn panes(&self) -> Vec<PluginPaneConfig> {
        Vec::new()
    }

    /// Settings objects to register in the host settings dialog.
    fn settings(&self) -> Vec<PluginSettingsConfig> {
        Vec::new()
    }
}

/// Host services reachable from plugin module factories.
pub trait PluginBridge {
    /// Create an indicator module provided by any loaded plugin.
    fn indicator(&self, indicator_name: &str) -> Option<IndicatorComputingPtr>;
}

/// A capability unit created on demand by a plugin.
pub trait PluginModule {
    fn init(&self, _bridge: &dyn PluginBridge) -> bool {
        true
    }

    fn unit(&self) {}

    /// View this module as an indicator, if it is one.
    fn into_indicator(self: Rc<Self>) -> Option<IndicatorComputingPtr> {
        None
    }
}

/// Modules computing a series from prices.
pub trait IndicatorComputing {
    /// Compute the indicator's output series from an input series.
    fn compute(&self, input: &[f64], params: &[PluginParam]) -> Option<Serie>;
}

/// A pane drawn by the host on behalf of a plugin.
pub trait PluginPane {
    fn init(&self) -> bool {
        true
    }

    fn unit(&self) {}

    /// Whether the pane can currently be displayed.
    fn can_be_displayed(&self) -> bool {
        true
    }
}

/// A settings object persisted by the host on behalf of a plugin.
pub trait PluginSettings {
    /// Category path used by the settings menu, e.g. `"plugins/indicators"`.
    fn category(&self) -> String;

    fn load_settings(&self) -> bool {
        true
    }

    fn save_settings(&self) -> bool {
        true
    }

    /// Serialize the values of the given scope, indented by `offset`.
    fn export_settings(&self, offset: &str, kind: SettingsType) -> String;

    /// Restore one value of the given scope.
    fn import_setting(&self, name: &str, parent_name: &str, value: &str, kind: SettingsType);
}
