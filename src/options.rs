use serde::{Deserialize, Serialize};

use crate::error::{QuakeError, Result};

/// Runtime behavior switches shared by every component of an app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuakeOptions {
    /// Render once at mount when `on_init` did not already render.
    pub initial_render: bool,
    /// Mount registered components found in a rendered tree.
    pub mount_nested: bool,
    /// Log template diagnostics when a component mounts.
    pub validate_templates: bool,
}

impl Default for QuakeOptions {
    fn default() -> Self {
        Self {
            initial_render: true,
            mount_nested: true,
            validate_templates: true,
        }
    }
}

impl QuakeOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(QuakeError::Config)
    }
}
