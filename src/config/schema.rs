//! Configuration schema definitions.
//!
//! These types are produced by [`crate::config::validation::validate`], never
//! deserialized directly, so every violation can be reported at once.

use std::collections::BTreeMap;

use serde_yaml::Value;

/// Default directory holding alternative character configurations.
pub const DEFAULT_CONFIG_ALTS_DIR: &str = "characters";

/// Root configuration for the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedConfig {
    /// Server section (`system`).
    pub system: ServerConfig,

    /// Every other top-level section, carried through untouched
    /// (`character`, feature toggles, ...).
    pub sections: BTreeMap<String, Value>,
}

impl ValidatedConfig {
    /// Look up an opaque section by name.
    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }
}

/// Server section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Interface to bind (e.g., "localhost", "0.0.0.0").
    pub host: String,

    /// TCP port, 1-65535.
    pub port: u16,

    /// Version tag of the configuration file layout.
    pub conf_version: Option<String>,

    /// Directory with alternative character configurations.
    pub config_alts_dir: String,

    /// Named prompt snippets handed to the agent.
    pub tool_prompts: BTreeMap<String, String>,
}
