//! Configuration loading, validation, and management for cybermem.
//!
//! Loads configuration from `~/.cybermem/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Selection strategies the selector understands.
pub const STRATEGIES: [&str; 3] = ["balanced", "recent", "relevant"];

/// The root configuration structure.
///
/// Maps directly to `~/.cybermem/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Working-memory budget and cache settings
    #[serde(default)]
    pub memory: MemoryConfig,

    /// Backing store layout and limits
    #[serde(default)]
    pub store: StoreConfig,

    /// Knowledge tag filter
    #[serde(default)]
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Token budget for one assembled context
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Default selection strategy ("balanced", "recent", "relevant")
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// How long loaded file content stays cached
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    /// Files above this size must be read by range
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Snapshot file name, stored in the protected subtree of `personal/`
    #[serde(default = "default_snapshot_file")]
    pub snapshot_file: String,
}

fn default_max_tokens() -> usize {
    8000
}
fn default_strategy() -> String {
    "balanced".into()
}
fn default_cache_ttl_secs() -> u64 {
    300
}
fn default_max_file_bytes() -> u64 {
    512 * 1024
}
fn default_snapshot_file() -> String {
    "memory_snapshot.json".into()
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            strategy: default_strategy(),
            cache_ttl_secs: default_cache_ttl_secs(),
            max_file_bytes: default_max_file_bytes(),
            snapshot_file: default_snapshot_file(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Directory holding `personal/` and `grid/` (default: `~/.cybermem/workspace`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,

    /// Path segment marking the read-only subtree
    #[serde(default = "default_protected_marker")]
    pub protected_marker: String,

    /// Widest span a ranged read may request, in lines
    #[serde(default = "default_max_range_lines")]
    pub max_range_lines: usize,

    /// Where removed directories wait for commit (default: `<base_dir>/.holding`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub holding_dir: Option<PathBuf>,
}

fn default_protected_marker() -> String {
    ".internal".into()
}
fn default_max_range_lines() -> usize {
    500
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            protected_marker: default_protected_marker(),
            max_range_lines: default_max_range_lines(),
            holding_dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Knowledge blocks carrying any of these tags are hidden from selection
    #[serde(default)]
    pub tag_blacklist: Vec<String>,
}

impl AppConfig {
    /// Load configuration from the default path (~/.cybermem/config.toml).
    ///
    /// Environment overrides (highest priority):
    /// - `CYBERMEM_HOME` relocates the whole config directory
    /// - `CYBERMEM_BASE_DIR` sets the store base directory
    /// - `CYBERMEM_MAX_TOKENS` sets the token budget
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        let mut config = Self::load_from(&config_path)?;

        if let Ok(dir) = std::env::var("CYBERMEM_BASE_DIR") {
            config.store.base_dir = Some(PathBuf::from(dir));
        }

        if let Ok(raw) = std::env::var("CYBERMEM_MAX_TOKENS") {
            config.memory.max_tokens = raw.parse().map_err(|_| {
                ConfigError::ValidationError(format!("CYBERMEM_MAX_TOKENS is not a number: {raw}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        match std::env::var("CYBERMEM_HOME") {
            Ok(dir) => PathBuf::from(dir),
            Err(_) => dirs_home().join(".cybermem"),
        }
    }

    /// The directory holding both namespace roots.
    pub fn base_dir(&self) -> PathBuf {
        self.store
            .base_dir
            .clone()
            .unwrap_or_else(|| Self::config_dir().join("workspace"))
    }

    pub fn personal_dir(&self) -> PathBuf {
        self.base_dir().join("personal")
    }

    pub fn grid_dir(&self) -> PathBuf {
        self.base_dir().join("grid")
    }

    pub fn holding_dir(&self) -> PathBuf {
        self.store
            .holding_dir
            .clone()
            .unwrap_or_else(|| self.base_dir().join(".holding"))
    }

    /// Where checkpoints are written: `personal/<marker>/<snapshot_file>`.
    pub fn snapshot_path(&self) -> PathBuf {
        self.personal_dir()
            .join(&self.store.protected_marker)
            .join(&self.memory.snapshot_file)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.memory.max_tokens == 0 {
            return Err(ConfigError::ValidationError(
                "memory.max_tokens must be > 0".into(),
            ));
        }

        if !STRATEGIES.contains(&self.memory.strategy.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "memory.strategy must be one of {STRATEGIES:?}, got '{}'",
                self.memory.strategy
            )));
        }

        if self.store.max_range_lines == 0 {
            return Err(ConfigError::ValidationError(
                "store.max_range_lines must be > 0".into(),
            ));
        }

        if self.store.protected_marker.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "store.protected_marker must not be empty".into(),
            ));
        }

        Ok(())
    }

    /// Generate a default config TOML string (for the `init` command).
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
