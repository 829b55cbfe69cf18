//! Plugin host configuration.
//!
//! Built-in defaults, optionally overlaid by a TOML file and then by
//! environment variables.

use std::path::{Path, PathBuf};

use ltg_plugin_api::{DEFAULT_ALLOCATOR_SYMBOL, DEFAULT_DELETER_SYMBOL, HOST_VERSION};
use serde::{Deserialize, Serialize};

use crate::error::{PluginError, Result};
use crate::library::native_extension;
use crate::loader::SymbolNames;

/// Plugin directory, relative to the application path.
pub const DEFAULT_PLUGIN_DIR: &str = "plugins";

/// Every plugin file name starts with this.
pub const DEFAULT_NAME_PREFIX: &str = "plugin_";

/// Build flavour tag a plugin file name must contain.
#[cfg(debug_assertions)]
pub const DEFAULT_RUNTIME_MARKER: &str = "_debug";
#[cfg(not(debug_assertions))]
pub const DEFAULT_RUNTIME_MARKER: &str = "_release";

/// Environment variable names
pub mod env_vars {
    pub const PLUGIN_DIR: &str = "LTG_PLUGIN_DIR";
    pub const PLUGIN_PREFIX: &str = "LTG_PLUGIN_PREFIX";
    pub const PLUGIN_MARKER: &str = "LTG_PLUGIN_MARKER";
}

/// What to do when two files derive the same plugin name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// The file found later replaces the one already registered.
    #[default]
    Replace,
    /// The first registered file is kept; later ones are not loaded.
    Reject,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginManagerConfig {
    pub plugin_dir: PathBuf,
    pub name_prefix: String,
    pub runtime_marker: String,
    pub allocator_symbol: String,
    pub deleter_symbol: String,
    pub duplicate_policy: DuplicatePolicy,
    /// Version reported to plugins through the host context.
    pub host_version: u32,
}

impl Default for PluginManagerConfig {
    fn default() -> Self {
        Self {
            plugin_dir: PathBuf::from(DEFAULT_PLUGIN_DIR),
            name_prefix: DEFAULT_NAME_PREFIX.to_string(),
            runtime_marker: DEFAULT_RUNTIME_MARKER.to_string(),
            allocator_symbol: DEFAULT_ALLOCATOR_SYMBOL.to_string(),
            deleter_symbol: DEFAULT_DELETER_SYMBOL.to_string(),
            duplicate_policy: DuplicatePolicy::default(),
            host_version: HOST_VERSION,
        }
    }
}

impl PluginManagerConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| PluginError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Apply `LTG_PLUGIN_*` environment variables on top of this config.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        self.plugin_dir = lookup(env_vars::PLUGIN_DIR)
            .map(PathBuf::from)
            .unwrap_or(self.plugin_dir);
        self.name_prefix = lookup(env_vars::PLUGIN_PREFIX).unwrap_or(self.name_prefix);
        self.runtime_marker = lookup(env_vars::PLUGIN_MARKER).unwrap_or(self.runtime_marker);
        self
    }

    pub fn symbol_names(&self) -> SymbolNames {
        SymbolNames {
            allocator: self.allocator_symbol.clone(),
            deleter: self.deleter_symbol.clone(),
        }
    }

    /// Whether `path` names a plugin library for this build.
    pub fn is_candidate(&self, path: &Path) -> bool {
        let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let extension_matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(native_extension()));

        extension_matches
            && file_name.starts_with(&self.name_prefix)
            && file_name.contains(&self.runtime_marker)
    }
}
