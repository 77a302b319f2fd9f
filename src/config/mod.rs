//! Configuration Management
//!
//! This module is the host configuration provider. The gateway only ever asks it
//! for flat string values by key, exactly like a server extension reading its
//! parameters from the host (`AddrServer`, `Port`, `DB`, `DB_OP1`..`DB_OP5`,
//! `username`, `userpassword`).
//!
//! # Configuration Locations
//! - Explicit: `--config <path>` (highest priority)
//! - Local: `.slotgate/config.json` (per-project)
//! - Global: `~/.config/slotgate/config.json` (per-user)
//!
//! The first file that exists wins; there is no merging between files. With no
//! file at all every slot reports "Not Configured".

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::driver::{DatabaseType, KEY_PASSWORD};
use crate::error::{GatewayError, Result};
use crate::pending::SlotStaging;

/// Read-only access to host configuration values
pub trait ConfigProvider: Send + Sync {
    /// Value stored under `key`, or `None` if the key is absent
    fn get_config_value(&self, key: &str) -> Option<String>;
}

impl ConfigProvider for HashMap<String, String> {
    fn get_config_value(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Driver call bounds
///
/// Defaults are deliberately short so a stalled database never stalls a batch
/// for long.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    /// Bound on opening a connection
    #[serde(default = "default_connect_secs")]
    pub connect_secs: u64,

    /// Bound on a single query or command
    #[serde(default = "default_command_secs")]
    pub command_secs: u64,

    /// TCP keepalive idle time for network drivers
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,
}

const fn default_connect_secs() -> u64 {
    2
}

const fn default_command_secs() -> u64 {
    3
}

const fn default_keepalive_secs() -> u64 {
    10
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_secs(),
            command_secs: default_command_secs(),
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

impl Timeouts {
    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

/// Gateway configuration file
///
/// Typed settings sit next to the flat host values:
/// ```json
/// {
///   "engine": "postgres",
///   "timeouts": { "connect_secs": 2, "command_secs": 3 },
///   "password_env": "SLOTGATE_PASSWORD",
///   "staging": { "DB_OP1": { "write": "retain" } },
///   "AddrServer": "127.0.0.1",
///   "Port": 5432,
///   "DB": "plant",
///   "DB_OP1": "recipes",
///   "username": "hmi"
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtensionConfig {
    /// Driver used for every slot
    #[serde(default)]
    pub engine: DatabaseType,

    /// Driver call bounds
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Environment variable name for password (if not storing password directly)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env: Option<String>,

    /// Staging policy per target key (`DB`, `DB_OP1`, ...)
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub staging: HashMap<String, SlotStaging>,

    /// Flat host values; scalars are read back as text
    #[serde(flatten)]
    pub values: HashMap<String, serde_json::Value>,
}

impl ExtensionConfig {
    /// Set a flat host value
    pub fn set_value(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), serde_json::Value::String(value.into()));
    }

    /// Staging policy for the slot whose target key is `target_key`
    #[must_use]
    pub fn staging_for(&self, target_key: &str) -> SlotStaging {
        self.staging.get(target_key).copied().unwrap_or_default()
    }

    /// Resolve environment variable references
    ///
    /// If `password_env` is set, its value replaces `userpassword`.
    pub fn resolve(mut self) -> Result<Self> {
        if let Some(env_var) = &self.password_env {
            match std::env::var(env_var) {
                Ok(password) => self.set_value(KEY_PASSWORD, password),
                Err(_) => {
                    return Err(GatewayError::config_error(format!(
                        "Environment variable {env_var} not found for password"
                    )));
                }
            }
        }

        Ok(self)
    }
}

impl ConfigProvider for ExtensionConfig {
    fn get_config_value(&self, key: &str) -> Option<String> {
        match self.values.get(key)? {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }
}

/// Configuration file location
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigLocation {
    /// Local config: `.slotgate/config.json`
    Local,
    /// Global config: `~/.config/slotgate/config.json`
    Global,
}

/// Get path to local config file (`.slotgate/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        GatewayError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".slotgate").join("config.json"))
}

/// Get path to global config file (`~/.config/slotgate/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| GatewayError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("slotgate").join("config.json"))
}

/// Path for a config location
pub fn config_path(location: ConfigLocation) -> Result<PathBuf> {
    match location {
        ConfigLocation::Local => local_config_path(),
        ConfigLocation::Global => global_config_path(),
    }
}

/// Load a configuration file
///
/// A missing file yields an empty configuration.
pub fn load_config(path: &Path) -> Result<ExtensionConfig> {
    if !path.exists() {
        return Ok(ExtensionConfig::default());
    }

    let contents = fs::read_to_string(path)
        .map_err(|e| GatewayError::config_error(format!("Could not read config file: {e}")))?;

    serde_json::from_str::<ExtensionConfig>(&contents)
        .map_err(|e| GatewayError::config_error(format!("Invalid config file format: {e}")))
}

/// Save a configuration file, creating parent directories as needed
pub fn save_config(path: &Path, config: &ExtensionConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            GatewayError::config_error(format!("Could not create config directory: {e}"))
        })?;
    }

    let contents = serde_json::to_string_pretty(config)
        .map_err(|e| GatewayError::config_error(format!("Could not serialize config: {e}")))?;

    fs::write(path, contents)
        .map_err(|e| GatewayError::config_error(format!("Could not write config file: {e}")))
}

/// Load configuration with precedence (explicit, then local, then global)
///
/// Returns the resolved configuration and the file it came from, if any.
pub fn load_with_precedence(explicit: Option<&Path>) -> Result<(ExtensionConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(GatewayError::config_error(format!(
                "Config file {} does not exist",
                path.display()
            )));
        }
        return Ok((load_config(path)?.resolve()?, Some(path.to_path_buf())));
    }

    for location in [ConfigLocation::Local, ConfigLocation::Global] {
        let path = config_path(location)?;
        if path.exists() {
            return Ok((load_config(&path)?.resolve()?, Some(path)));
        }
    }

    Ok((ExtensionConfig::default(), None))
}

/// Starter configuration written by `slotgate init`
#[must_use]
pub fn template(engine: DatabaseType) -> ExtensionConfig {
    let mut config = ExtensionConfig { engine, ..ExtensionConfig::default() };
    config.set_value("AddrServer", "127.0.0.1");
    config.set_value("Port", engine.default_port().map(|p| p.to_string()).unwrap_or_default());
    config.set_value("DB", "");
    for k in 1..=5 {
        config.set_value(format!("DB_OP{k}"), "");
    }
    config.set_value("username", "");
    config.set_value(KEY_PASSWORD, "");
    config
}
