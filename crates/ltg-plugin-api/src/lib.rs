//! LogToGraph plugin API.
//!
//! This crate is the contract shared by the host application and every plugin
//! library it loads at runtime. A plugin is a shared library (`.so`, `.dylib`
//! or `.dll`) exporting two unmangled C symbols:
//!
//! - `allocator`: takes no arguments, returns a `*mut RootPlugin`
//! - `deleter`: takes that pointer back and releases it
//!
//! The [`declare_plugin!`] macro generates both.
//!
//! # Quick Start
//!
//! ```rust
//! use ltg_plugin_api::prelude::*;
//!
//! #[derive(Default)]
//! struct MyPlugin;
//!
//! impl PluginInterface for MyPlugin {
//!     fn init(&mut self, _host: &HostContext) -> bool { true }
//!     fn unit(&mut self) {}
//!     fn name(&self) -> String { "MyPlugin".into() }
//!     fn author(&self) -> String { "Me".into() }
//!     fn version(&self) -> String { "1.0.0".into() }
//!     fn description(&self) -> String { "Does nothing".into() }
//!     fn modules_infos(&self) -> Vec<PluginModuleInfos> { Vec::new() }
//!     fn create_module(&self, _name: &str, _bridge: &dyn PluginBridge) -> Option<PluginModulePtr> {
//!         None
//!     }
//! }
//!
//! declare_plugin!(MyPlugin, MyPlugin::default);
//! ```
//!
//! # ABI
//!
//! Rust has no stable layout for trait objects, so the host and its plugins
//! must be built by the same toolchain against the same version of this crate,
//! and neither side may install its own `#[global_allocator]`. Plugins can
//! state the oldest host they support through
//! [`PluginInterface::minimal_host_version`].

pub mod host;
#[macro_use]
pub mod macros;
pub mod plugin;
pub mod types;

pub use host::HostContext;
pub use plugin::{
    IndicatorComputing, IndicatorComputingPtr, PluginBridge, PluginInterface, PluginModule,
    PluginModulePtr, PluginPane, PluginSettings,
};
pub use types::{
    ModuleTypeError, PaneDisposal, PluginModuleInfos, PluginModuleType, PluginPaneConfig,
    PluginParam, PluginSettingsConfig, Serie, SettingsType,
};

/// Version of the host API, encoded as `major * 10_000 + minor * 100 + patch`.
pub const HOST_VERSION: u32 = 300;

/// Default name of the exported constructor symbol.
pub const DEFAULT_ALLOCATOR_SYMBOL: &str = "allocator";

/// Default name of the exported destructor symbol.
pub const DEFAULT_DELETER_SYMBOL: &str = "deleter";

/// Root object handed across the library boundary.
///
/// The allocator returns a thin pointer to this fat trait-object box.
pub type RootPlugin = Box<dyn PluginInterface>;

/// Signature of the exported `allocator` symbol.
#[allow(improper_ctypes_definitions)]
pub type PluginAllocatorFn = unsafe extern "C" fn() -> *mut RootPlugin;

/// Signature of the exported `deleter` symbol.
#[allow(improper_ctypes_definitions)]
pub type PluginDeleterFn = unsafe extern "C" fn(*mut RootPlugin);

/// Prelude module with common imports
pub mod prelude {
    pub use crate::host::HostContext;
    pub use crate::plugin::{
        IndicatorComputing, IndicatorComputingPtr, PluginBridge, PluginInterface, PluginModule,
        PluginModulePtr, PluginPane, PluginSettings,
    };
    pub use crate::types::{
        PaneDisposal, PluginModuleInfos, PluginModuleType, PluginPaneConfig, PluginParam,
        PluginSettingsConfig, Serie, SettingsType,
    };
    pub use crate::{declare_plugin, RootPlugin, HOST_VERSION};
}
