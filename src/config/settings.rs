//! User settings and preferences
//!
//! Manages application settings stored in `<data dir>/dbpilot/settings.toml`

use crate::config::ConnectionConfig;
use crate::error::ConfigResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Application settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Deadline applied to every tool invocation
    #[serde(default = "default_tool_timeout")]
    pub tool_timeout_secs: u64,

    /// Default tracing filter (overridden by `DBPILOT_LOG`)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Rows printed by the console before truncating
    #[serde(default = "default_row_limit")]
    pub display_row_limit: usize,

    #[serde(default)]
    pub updates: UpdateSettings,
}

/// Background release check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Endpoint returning the latest release as JSON with a `tag_name` field
    #[serde(default)]
    pub releases_url: Option<String>,
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_row_limit() -> usize {
    200
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout(),
            log_level: default_log_level(),
            display_row_limit: default_row_limit(),
            updates: UpdateSettings::default(),
        }
    }
}

impl Default for UpdateSettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            releases_url: None,
        }
    }
}

impl Settings {
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.max(1))
    }
}

/// Load settings from the default config file
pub fn load_settings() -> ConfigResult<Settings> {
    let path = ConnectionConfig::config_dir()?.join("settings.toml");
    load_settings_from(&path)
}

/// Load settings from a specific file; a missing file yields defaults
pub fn load_settings_from(path: &Path) -> ConfigResult<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let content = std::fs::read_to_string(path)?;
    let settings: Settings = toml::from_str(&content)?;
    Ok(settings)
}
