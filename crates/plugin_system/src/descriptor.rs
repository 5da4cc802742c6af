//! Static plugin metadata.

use crate::version::{Version, VersionRequirement};
use serde::{Deserialize, Serialize};

/// Normalizes a plugin name to its case-insensitive registry key.
pub fn plugin_key(name: &str) -> String {
    name.to_lowercase()
}

/// One dependency declaration: a name plus zero or more version
/// requirements that must all hold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dependency {
    pub name: String,
    #[serde(default)]
    pub requirements: Vec<VersionRequirement>,
}

impl Dependency {
    /// Depends on `name` at any version.
    pub fn on(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requirements: Vec::new(),
        }
    }

    pub fn on_version(name: impl Into<String>, requirement: VersionRequirement) -> Self {
        Self {
            name: name.into(),
            requirements: vec![requirement],
        }
    }

    pub fn and(mut self, requirement: VersionRequirement) -> Self {
        self.requirements.push(requirement);
        self
    }
}

/// Static plugin metadata; the unit the dependency resolver works over.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginDescriptor {
    /// Registry name; matching is case-insensitive.
    pub name: String,
    /// Human-facing name used in messages and violations.
    pub display_name: String,
    pub version: Version,
    /// Must exist and validate for the plugin to be installable.
    #[serde(default)]
    pub required: Vec<Dependency>,
    /// Influence load order when present; never required to exist.
    #[serde(default)]
    pub optional: Vec<Dependency>,
}

impl PluginDescriptor {
    pub fn new(
        name: impl Into<String>,
        display_name: impl Into<String>,
        version: Version,
    ) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            version,
            required: Vec::new(),
            optional: Vec::new(),
        }
    }

    pub fn with_required(mut self, dependency: Dependency) -> Self {
        self.required.push(dependency);
        self
    }

    pub fn with_optional(mut self, dependency: Dependency) -> Self {
        self.optional.push(dependency);
        self
    }

    pub fn key(&self) -> String {
        plugin_key(&self.name)
    }
}
