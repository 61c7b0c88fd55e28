use crate::channel::ChannelSettings;
use crate::decoder::SchemaPaths;
use crate::error::config::ConfigError;
use crate::session::{AdapterSpec, SessionSettings};

use common::ErrorLocation;

use std::collections::HashSet;
use std::env;
use std::panic::Location;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{info, warn};
use serde::{Deserialize, Serialize};

const CONFIG_FILE_NAME: &str = "hmi.json";
const CONFIG_VERSION: u32 = 1;
const CONFIG_DIR_NAME: &str = "hmi-harness";

/// Overrides the platform config directory when set.
pub const CONFIG_DIR_ENV: &str = "HMI_HARNESS_CONFIG_DIR";

// ============================================
// CONFIG STRUCTS
// ============================================

/// One entry of the default adapter list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    #[serde(default)]
    pub adapter_id: Option<u32>,
    pub adapter_name: String,
    pub ip_address: String,
    pub port_number: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default = "default_schema_directory")]
    pub directory: String,
    #[serde(default = "default_common_file")]
    pub common_file: String,
    #[serde(default = "default_share_file")]
    pub share_file: String,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            directory: default_schema_directory(),
            common_file: default_common_file(),
            share_file: default_share_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_reconnection_attempts")]
    pub reconnection_attempts: u32,
    #[serde(default = "default_initial_retry_ms")]
    pub initial_retry_ms: u64,
    #[serde(default = "default_max_retry_ms")]
    pub max_retry_ms: u64,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            namespace: default_namespace(),
            reconnection_attempts: default_reconnection_attempts(),
            initial_retry_ms: default_initial_retry_ms(),
            max_retry_ms: default_max_retry_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_unavailable_threshold")]
    pub unavailable_threshold: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            unavailable_threshold: default_unavailable_threshold(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HmiConfig {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_adapters")]
    pub adapters: Vec<AdapterConfig>,

    #[serde(default)]
    pub schemas: SchemaConfig,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

impl Default for HmiConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            adapters: default_adapters(),
            schemas: SchemaConfig::default(),
            channel: ChannelConfig::default(),
            session: SessionConfig::default(),
        }
    }
}

// ============================================
// DEFAULT FUNCTIONS
// ============================================

fn default_version() -> u32 {
    CONFIG_VERSION
}
fn default_adapters() -> Vec<AdapterConfig> {
    vec![AdapterConfig {
        adapter_id: Some(0),
        adapter_name: "Local USB Adapter".to_string(),
        ip_address: "localhost".to_string(),
        port_number: 5001,
    }]
}
fn default_schema_directory() -> String {
    crate::SCHEMA_DIR.to_string()
}
fn default_common_file() -> String {
    crate::COMMON_SCHEMA_FILE.to_string()
}
fn default_share_file() -> String {
    crate::SHARE_SCHEMA_FILE.to_string()
}
fn default_namespace() -> String {
    crate::channel::websocket::DEFAULT_NAMESPACE.to_string()
}
fn default_reconnection_attempts() -> u32 {
    crate::channel::websocket::DEFAULT_RECONNECTION_ATTEMPTS
}
fn default_initial_retry_ms() -> u64 {
    500
}
fn default_max_retry_ms() -> u64 {
    5000
}
fn default_unavailable_threshold() -> u32 {
    crate::session::DEFAULT_UNAVAILABLE_THRESHOLD
}

// ============================================
// IMPLEMENTATION
// ============================================

impl HmiConfig {
    /// Directory holding `hmi.json`: `$HMI_HARNESS_CONFIG_DIR`, else the
    /// platform config directory.
    pub fn default_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = env::var_os(CONFIG_DIR_ENV).filter(|dir| !dir.is_empty()) {
            return Ok(PathBuf::from(dir));
        }
        dirs::config_dir()
            .map(|dir| dir.join(CONFIG_DIR_NAME))
            .ok_or_else(|| ConfigError::DirectoryNotFound {
                location: ErrorLocation::from(Location::caller()),
            })
    }

    /// Load config from {config_dir}/hmi.json.
    ///
    /// A missing file yields defaults; a present but unreadable, corrupt or
    /// invalid one is an error.
    pub fn load(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            info!(
                "Config file not found at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&config_path).map_err(|e| {
            warn!("Failed to read config file: {e}");
            ConfigError::ReadError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                source: e,
            }
        })?;

        let config: HmiConfig = serde_json::from_str(&contents).map_err(|e| {
            warn!("Failed to parse config JSON: {e}");
            ConfigError::ParseError {
                location: ErrorLocation::from(Location::caller()),
                path: config_path.clone(),
                reason: e.to_string(),
            }
        })?;

        config.validate()?;

        info!("Config loaded from {}", config_path.display());
        Ok(config)
    }

    /// Save config to {config_dir}/hmi.json via temp file + rename.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        self.validate()?;

        std::fs::create_dir_all(config_dir).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_dir.to_path_buf(),
            source: e,
        })?;

        let config_path = config_dir.join(CONFIG_FILE_NAME);
        let temp_path = config_dir.join(format!("{CONFIG_FILE_NAME}.tmp"));

        let json = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializeError {
            location: ErrorLocation::from(Location::caller()),
            reason: e.to_string(),
        })?;

        std::fs::write(&temp_path, json).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: temp_path.clone(),
            source: e,
        })?;

        std::fs::rename(&temp_path, &config_path).map_err(|e| ConfigError::WriteError {
            location: ErrorLocation::from(Location::caller()),
            path: config_path.clone(),
            source: e,
        })?;

        info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// Validate config values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ValidationError`] for the first invalid value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version == 0 || self.version > CONFIG_VERSION {
            return Err(validation(format!(
                "Invalid version: {} (expected 1-{CONFIG_VERSION})",
                self.version
            )));
        }

        let mut ids = HashSet::new();
        for adapter in &self.adapters {
            AdapterSpec::try_from(adapter)
                .map_err(|e| validation(format!("Adapter '{}': {e}", adapter.adapter_name)))?;
            if let Some(id) = adapter.adapter_id {
                if !ids.insert(id) {
                    return Err(validation(format!("Duplicate adapter id {id}")));
                }
            }
        }

        if self.schemas.common_file.is_empty() || self.schemas.share_file.is_empty() {
            return Err(validation("Schema file names cannot be empty".to_string()));
        }

        if !self.channel.namespace.starts_with('/') {
            return Err(validation(format!(
                "Invalid namespace: '{}' (must start with '/')",
                self.channel.namespace
            )));
        }

        if self.channel.initial_retry_ms == 0
            || self.channel.initial_retry_ms > self.channel.max_retry_ms
        {
            return Err(validation(format!(
                "Invalid retry bounds: initial {}ms, max {}ms",
                self.channel.initial_retry_ms, self.channel.max_retry_ms
            )));
        }

        // The transport reports `reconnection_attempts + 1` connect errors before
        // giving up; Failed needs `unavailable_threshold + 1` of them.
        if self.channel.reconnection_attempts < self.session.unavailable_threshold {
            return Err(validation(format!(
                "Reconnection attempts {} below unavailable threshold {}",
                self.channel.reconnection_attempts, self.session.unavailable_threshold
            )));
        }

        Ok(())
    }

    /// Adapters to seed the session with, in file order.
    pub fn adapter_specs(&self) -> Result<Vec<AdapterSpec>, ConfigError> {
        self.adapters
            .iter()
            .map(|adapter| {
                AdapterSpec::try_from(adapter)
                    .map_err(|e| validation(format!("Adapter '{}': {e}", adapter.adapter_name)))
            })
            .collect()
    }

    /// Schema resource paths, resolved against `base` when relative.
    pub fn schema_paths(&self, base: &Path) -> SchemaPaths {
        let directory = base.join(&self.schemas.directory);
        SchemaPaths {
            common: directory.join(&self.schemas.common_file),
            share: directory.join(&self.schemas.share_file),
        }
    }

    pub fn channel_settings(&self) -> ChannelSettings {
        ChannelSettings {
            namespace: self.channel.namespace.clone(),
            reconnection_attempts: self.channel.reconnection_attempts,
            initial_retry: Duration::from_millis(self.channel.initial_retry_ms),
            max_retry: Duration::from_millis(self.channel.max_retry_ms),
        }
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            unavailable_threshold: self.session.unavailable_threshold,
        }
    }
}

impl TryFrom<&AdapterConfig> for AdapterSpec {
    type Error = common::ValidationError;

    fn try_from(adapter: &AdapterConfig) -> Result<Self, Self::Error> {
        AdapterSpec::new(
            adapter.adapter_id,
            adapter.adapter_name.clone(),
            adapter.ip_address.clone(),
            adapter.port_number,
        )
    }
}

#[track_caller]
fn validation(reason: String) -> ConfigError {
    ConfigError::ValidationError {
        location: ErrorLocation::from(Location::caller()),
        reason,
    }
}
