//! LogToGraph plugin host.
//!
//! Loads plugin libraries built against `ltg-plugin-api` and manages their
//! lifecycle.
//!
//! # Layers
//!
//! - [`library`]: cross-platform dynamic library handle
//! - [`loader`]: resolves the `allocator` / `deleter` factories of one library
//! - [`instance`]: one plugin, its init outcome and its ordered teardown
//! - [`lease`]: keeps a library loaded while objects it produced are alive
//! - [`manager`]: discovery, type filtering, registry and aggregation
//!
//! # Example
//!
//! ```rust,no_run
//! use ltg_plugins::prelude::*;
//!
//! let mut manager = PluginManager::new(PluginManagerConfig::default().with_env_overrides());
//! let report = manager.load_plugins("/opt/logtograph", &[PluginModuleType::Scripting]);
//! println!("{} plugins loaded", report.loaded.len());
//!
//! if let Some(module) = manager.create_plugin_module("Lua") {
//!     // hand the module to the scripting engine
//!     drop(module);
//! }
//! manager.unload_plugins();
//! ```

pub mod config;
pub mod error;
pub mod instance;
pub mod lease;
pub mod library;
pub mod loader;
pub mod manager;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{DuplicatePolicy, PluginManagerConfig};
pub use error::{LibraryError, PluginError, Result};
pub use instance::{LoadOutcome, PluginHandle, PluginInstance, PluginRef};
pub use lease::{Leased, LibraryLease};
pub use library::{native_extension, LibraryHandle, SharedLibrary, SystemLibrary};
pub use loader::{PluginBox, PluginLoader, SymbolNames};
pub use manager::{LoadReport, PluginManager};

/// Prelude module with common imports
pub mod prelude {
    pub use crate::config::{DuplicatePolicy, PluginManagerConfig};
    pub use crate::error::{PluginError, Result};
    pub use crate::instance::{LoadOutcome, PluginInstance};
    pub use crate::manager::{LoadReport, PluginManager};
    pub use ltg_plugin_api::prelude::*;
}
