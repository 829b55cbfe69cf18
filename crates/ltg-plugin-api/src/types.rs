//! Plain data exchanged between the host and its plugins.

use std::collections::BTreeMap;
use std::fmt::{self, Display, Formatter};
use std::rc::Weak;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::plugin::{PluginPane, PluginSettings};

/// A time series of values.
pub type Serie = Vec<f64>;

/// Kind of capability a plugin module provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginModuleType {
    None,
    DataBroker,
    Charting,
    Indicator,
    Scripting,
}

impl PluginModuleType {
    /// Every module type, in declaration order.
    pub const ALL: [PluginModuleType; 5] = [
        PluginModuleType::None,
        PluginModuleType::DataBroker,
        PluginModuleType::Charting,
        PluginModuleType::Indicator,
        PluginModuleType::Scripting,
    ];

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PluginModuleType::None => "none",
            PluginModuleType::DataBroker => "data_broker",
            PluginModuleType::Charting => "charting",
            PluginModuleType::Indicator => "indicator",
            PluginModuleType::Scripting => "scripting",
        }
    }
}

impl Display for PluginModuleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown module type name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown plugin module type: {0}")]
pub struct ModuleTypeError(pub String);

impl FromStr for PluginModuleType {
    type Err = ModuleTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        PluginModuleType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| ModuleTypeError(s.to_string()))
    }
}

/// Descriptor of one module a plugin can instantiate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginModuleInfos {
    /// Menu path under which the module is listed (may be empty).
    pub path: String,

    /// Module name, also the key passed to `create_module`.
    pub label: String,

    /// Module type
    pub module_type: PluginModuleType,

    /// RGBA display color
    pub color: [f32; 4],

    /// Free-form extra attributes
    pub dict: BTreeMap<String, String>,
}

impl PluginModuleInfos {
    /// Create a new module descriptor.
    pub fn new(
        path: impl Into<String>,
        label: impl Into<String>,
        module_type: PluginModuleType,
    ) -> Self {
        Self {
            path: path.into(),
            label: label.into(),
            module_type,
            color: [0.0; 4],
            dict: BTreeMap::new(),
        }
    }

    /// Set the display color.
    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.color = color;
        self
    }

    /// Add an extra attribute.
    pub fn with_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dict.insert(key.into(), value.into());
        self
    }
}

/// Where the host docks a plugin pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaneDisposal {
    #[default]
    Central,
    Left,
    Right,
    Bottom,
}

/// A pane a plugin wants the host to register.
#[derive(Debug, Clone)]
pub struct PluginPaneConfig {
    pub pane: Weak<dyn PluginPane>,
    pub name: String,
    pub category: String,
    pub disposal: PaneDisposal,
    pub disposal_ratio: f32,
    pub opened_default: bool,
    pub focused_default: bool,
}

impl PluginPaneConfig {
    /// Create a pane descriptor docked in the central area.
    pub fn new(pane: Weak<dyn PluginPane>, name: impl Into<String>) -> Self {
        Self {
            pane,
            name: name.into(),
            category: String::new(),
            disposal: PaneDisposal::Central,
            disposal_ratio: 0.0,
            opened_default: false,
            focused_default: false,
        }
    }
}

/// Scope of a settings value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingsType {
    #[default]
    None,
    /// Shared by every user of the application
    App,
    /// Specific to the current project
    Project,
}

/// A settings object a plugin wants the host to persist and display.
#[derive(Debug, Clone)]
pub struct PluginSettingsConfig {
    pub settings: Weak<dyn PluginSettings>,
}

impl PluginSettingsConfig {
    pub fn new(settings: Weak<dyn PluginSettings>) -> Self {
        Self { settings }
    }
}

/// Named parameter passed to an indicator computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PluginParam {
    Number { name: String, value: f64 },
    Text { name: String, value: String },
}

impl PluginParam {
    pub fn number(name: impl Into<String>, value: f64) -> Self {
        PluginParam::Number {
            name: name.into(),
            value,
        }
    }

    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        PluginParam::Text {
            name: name.into(),
            value: value.into(),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            PluginParam::Number { name, .. } | PluginParam::Text { name, .. } => name,
        }
    }

    /// Numeric value, if this is a numeric parameter.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            PluginParam::Number { value, .. } => Some(*value),
            PluginParam::Text { .. } => None,
        }
    }
}
