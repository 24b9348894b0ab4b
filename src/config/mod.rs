//! Configuration module for eventrecord-rs
//!
//! This module handles application configuration including:
//! - Which entry store backs the recorders and where it keeps its data
//! - Playback defaults applied to new recorders
//! - Start-up housekeeping (discarding orphaned storage)
//!
//! # App Data Location
//!
//! Application data is stored in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.eventrecord.eventrecord-rs/`
//! - **macOS**: `~/Library/Application Support/dev.eventrecord.eventrecord-rs/`
//! - **Windows**: `%APPDATA%\dev.eventrecord.eventrecord-rs\`
//!
//! # Files
//!
//! - `eventrecord.toml` - Configuration, every field optional
//! - `store/` - Namespace files written by the file entry store
//! - `logs/` - Rolling log files written by the demo binary
//!
//! # Example
//!
//! ```ignore
//! use eventrecord_rs::config::AppConfig;
//!
//! let config = AppConfig::load_or_default(&AppConfig::default_path()?);
//! let store = eventrecord_rs::backend::open_store(&config.store)?;
//! ```

pub mod settings;

pub use settings::*;

use crate::error::{RecorderError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application identifier for data directories
pub const APP_ID: &str = "dev.eventrecord.eventrecord-rs";

/// Config filename
pub const CONFIG_FILE: &str = "eventrecord.toml";

/// Directory (under the app data dir) used by the file store
pub const STORE_DIR: &str = "store";

/// Directory (under the app data dir) used for log files
pub const LOG_DIR: &str = "logs";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        RecorderError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            RecorderError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

// ==================== Store Config ====================

/// Which entry store implementation to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// Volatile in-process store
    Memory,
    /// JSON-lines files, one per namespace
    #[default]
    File,
}

/// Entry store configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Store implementation
    #[serde(default)]
    pub backend: StoreBackend,

    /// Root directory for the file store (defaults to `<app data>/store`)
    #[serde(default)]
    pub data_dir: Option<PathBuf>,
}

impl StoreConfig {
    /// In-memory store configuration
    pub fn memory() -> Self {
        Self {
            backend: StoreBackend::Memory,
            data_dir: None,
        }
    }

    /// File store rooted at `dir`
    pub fn file(dir: impl Into<PathBuf>) -> Self {
        Self {
            backend: StoreBackend::File,
            data_dir: Some(dir.into()),
        }
    }

    /// Resolve the directory the file store should use
    pub fn resolve_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => Ok(ensure_app_data_dir()?.join(STORE_DIR)),
        }
    }
}

// ==================== App Config ====================

/// Top level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version for future migration support
    #[serde(default = "default_config_version")]
    pub version: u32,

    /// Discard everything left in the store by a previous process on start-up
    #[serde(default = "default_true")]
    pub release_orphans_on_start: bool,

    /// Entry store settings
    #[serde(default)]
    pub store: StoreConfig,

    /// Playback defaults for new recorders
    #[serde(default)]
    pub playback: PlaybackSettings,
}

fn default_config_version() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: 1,
            release_orphans_on_start: true,
            store: StoreConfig::default(),
            playback: PlaybackSettings::default(),
        }
    }
}

impl AppConfig {
    /// Configuration backed by an in-memory store, handy for tests and demos
    pub fn in_memory() -> Self {
        Self {
            store: StoreConfig::memory(),
            ..Default::default()
        }
    }

    /// Default config file location
    pub fn default_path() -> Result<PathBuf> {
        Ok(ensure_app_data_dir()?.join(CONFIG_FILE))
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RecorderError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;

        toml::from_str(&content)
            .map_err(|e| RecorderError::Config(format!("Failed to parse config: {}", e)))
    }

    /// Load configuration, returning defaults when the file is missing or invalid
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        Self::load(path).unwrap_or_else(|e| {
            tracing::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save configuration as TOML
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                RecorderError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| RecorderError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| RecorderError::Config(format!("Failed to write config: {}", e)))
    }
}
