//! Service configuration.
//!
//! Handles loading, validating, and merging `picstash.toml`. Stock defaults
//! are serialized to a TOML table and the user file is merged on top, so a
//! config file only needs the keys it wants to change.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [engine]
//! default_format = "png"    # Output format when nothing else decides
//! # format = "webp"         # Force every derivative to this format
//! quality = 95              # Default lossy quality (0-100)
//!
//! [[engine.backends]]
//! kind = "native"           # native | gifsicle
//! mimetypes = ["image/jpeg", "image/png", "image/gif", "image/bmp", "image/tiff", "image/webp"]
//! weight = 0                # Lower weights are tried first
//!
//! [shard]
//! width = 0                 # Characters per directory level
//! depth = 0                 # Directory levels
//! rest_only = false         # Last segment is the key remainder, not the whole key
//!
//! [options]
//! enable_cascade_delete = false
//! persist_timeout_ms = 2000 # Deadline for background persistence
//! fetch_timeout_ms = 10000  # Deadline for remote sources
//!
//! [index]
//! kind = "memory"           # memory | dummy
//! prefix = ""
//!
//! [storage.source]
//! kind = "fs"               # fs | memory
//! root = "images"
//!
//! [storage.destination]
//! kind = "fs"
//! root = "cache"
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::types::Format;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Service configuration loaded from `picstash.toml`.
///
/// All fields have defaults. Unknown keys are rejected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub engine: EngineConfig,
    pub shard: ShardConfig,
    pub options: OptionsConfig,
    pub index: IndexConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.quality > 100 {
            return Err(ConfigError::Validation(
                "engine.quality must be 0-100".into(),
            ));
        }
        if self.engine.backends.is_empty() {
            return Err(ConfigError::Validation(
                "engine.backends must not be empty".into(),
            ));
        }
        for backend in &self.engine.backends {
            if backend.mimetypes.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "engine.backends: {} backend needs at least one mimetype",
                    backend.kind.as_str()
                )));
            }
            if let Some(unknown) = backend
                .mimetypes
                .iter()
                .find(|m| Format::from_content_type(m).is_none())
            {
                return Err(ConfigError::Validation(format!(
                    "engine.backends: unknown mimetype {unknown}"
                )));
            }
        }
        if self.options.persist_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "options.persist_timeout_ms must be positive".into(),
            ));
        }
        if self.options.fetch_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "options.fetch_timeout_ms must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub default_format: Format,
    /// Forced output format; beats the source format but not `fmt=`.
    pub format: Option<Format>,
    pub quality: u32,
    pub backends: Vec<BackendConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_format: Format::Png,
            format: None,
            quality: 95,
            backends: vec![BackendConfig::default()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Native,
    Gifsicle,
}

impl BackendKind {
    pub fn as_str(self) -> &'static str {
        match self {
            BackendKind::Native => "native",
            BackendKind::Gifsicle => "gifsicle",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    pub kind: BackendKind,
    /// Executable for external-process backends.
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default = "all_mimetypes")]
    pub mimetypes: Vec<String>,
    #[serde(default)]
    pub weight: i32,
}

fn all_mimetypes() -> Vec<String> {
    Format::ALL
        .iter()
        .map(|f| f.content_type().to_string())
        .collect()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: BackendKind::Native,
            path: None,
            mimetypes: all_mimetypes(),
            weight: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ShardConfig {
    pub width: usize,
    pub depth: usize,
    pub rest_only: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OptionsConfig {
    pub enable_cascade_delete: bool,
    pub default_user_agent: String,
    pub persist_timeout_ms: u64,
    pub fetch_timeout_ms: u64,
}

pub fn default_user_agent() -> String {
    format!("picstash/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            enable_cascade_delete: false,
            default_user_agent: default_user_agent(),
            persist_timeout_ms: 2000,
            fetch_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    #[default]
    Memory,
    Dummy,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IndexConfig {
    pub kind: IndexKind,
    pub prefix: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Fs,
    Memory,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub kind: StorageKind,
    /// Root directory for `fs` stores.
    pub root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub source: StoreConfig,
    pub destination: StoreConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            source: StoreConfig {
                kind: StorageKind::Fs,
                root: "images".to_string(),
            },
            destination: StoreConfig {
                kind: StorageKind::Fs,
                root: "cache".to_string(),
            },
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(Config::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely, arrays included.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto the stock defaults, then deserialize and
/// validate.
pub fn resolve_config(overlay: Option<toml::Value>) -> Result<Config, ConfigError> {
    let base = stock_defaults_value()?;
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from a file, falling back to defaults when it is absent.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    resolve_config(load_raw_config(path)?)
}

/// Returns a fully-commented stock `picstash.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# picstash configuration
# ======================
# Every key is optional; the values below are the defaults.

[engine]
# Output format used when the request, the forced format and the source
# all leave it open.
default_format = "png"

# Force every derivative to one format. A request's fmt= still wins.
# format = "webp"

# Default lossy quality (0-100) when a request has no q=.
quality = 95

# Codec backends, tried in ascending weight for matching mimetypes.
# A backend that cannot perform an operation hands it to the next one.
[[engine.backends]]
kind = "native"
mimetypes = ["image/jpeg", "image/png", "image/gif", "image/bmp", "image/tiff", "image/webp"]
weight = 0

# Uncomment to let gifsicle handle GIF resize/thumbnail first.
# Skipped at startup when the executable is not found.
# [[engine.backends]]
# kind = "gifsicle"
# path = "gifsicle"
# mimetypes = ["image/gif"]
# weight = -1

[shard]
# Split derivative keys into nested directories: depth levels of width
# characters each. 0 disables sharding.
width = 0
depth = 0
# Use the key remainder instead of the whole key as the file name.
rest_only = false

[options]
# Track derivatives per source so deleting a source removes them too.
enable_cascade_delete = false

# User agent for remote (url=) sources.
# default_user_agent = "picstash/<version>"

# Deadline for background persistence, in milliseconds.
persist_timeout_ms = 2000

# Deadline for downloading remote sources, in milliseconds.
fetch_timeout_ms = 10000

[index]
# memory: in-process map; dummy: remember nothing (disables caching).
kind = "memory"
# Namespace prepended to every index key.
prefix = ""

[storage.source]
# fs: directory on disk; memory: in-process map.
kind = "fs"
root = "images"

[storage.destination]
kind = "fs"
root = "cache"
"##
}
