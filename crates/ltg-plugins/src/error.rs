//! Error types for the plugin host.

use std::path::PathBuf;

/// Result type for plugin host operations.
pub type Result<T> = std::result::Result<T, PluginError>;

/// Failures reported by the OS dynamic loader.
#[derive(Debug, thiserror::Error)]
pub enum LibraryError {
    /// The library file, or one of the libraries it depends on, is missing.
    #[error("Module not found while loading {path}: {reason}")]
    ModuleNotFound { path: PathBuf, reason: String },

    /// The file exists but could not be mapped.
    #[error("Failed to load {path}: {reason}")]
    LoadFailed { path: PathBuf, reason: String },

    /// The OS refused to unload the library.
    #[error("Failed to unload {path}: {reason}")]
    UnloadFailed { path: PathBuf, reason: String },
}

impl LibraryError {
    /// Whether this is the "module not found" flavour of load failure.
    pub fn is_module_not_found(&self) -> bool {
        matches!(self, LibraryError::ModuleNotFound { .. })
    }
}

/// Plugin host error types.
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// Dynamic loader failure.
    #[error(transparent)]
    Library(#[from] LibraryError),

    /// Invalid configuration file.
    #[error("Invalid plugin configuration: {0}")]
    InvalidConfiguration(#[from] toml::de::Error),

    /// Filesystem failure.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A second plugin derived a name already present in the registry.
    #[error("Duplicate plugin name '{name}': {existing} already loaded, {rejected} rejected")]
    DuplicateName {
        name: String,
        existing: PathBuf,
        rejected: PathBuf,
    },

    /// Unrecognized module type name.
    #[error(transparent)]
    UnknownModuleType(#[from] ltg_plugin_api::ModuleTypeError),

    /// Plugin not found in the registry.
    #[error("Plugin not found: {0}")]
    NotFound(String),
}
