//! Configuration management for the DirGate gateway.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/dirgate/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use protocol::PolicyDocument;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::files::{TreeLimits, DEFAULT_INVALID_CHARS};

/// Default byte limit for file reads (10MB).
pub const DEFAULT_READ_LIMIT: u64 = 10 * 1024 * 1024;

/// Maximum byte limit a client may request (100MB).
pub const MAX_READ_LIMIT: u64 = 100 * 1024 * 1024;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("allowed_directories must contain at least one directory")]
    NoAllowedDirectories,

    #[error("allowed directory must be an absolute path, got {0}")]
    RelativeAllowedDirectory(PathBuf),

    #[error("listing limits must satisfy 1 <= default_limit <= max_limit, got {default} and {max}")]
    InvalidListingLimits { default: usize, max: usize },

    #[error("read limits must satisfy 1 <= default_limit <= max_limit, got {default} and {max}")]
    InvalidReadLimits { default: u64, max: u64 },

    #[error("cache capacity must be greater than 0")]
    InvalidCacheCapacity,

    #[error("cache ttl_secs must be greater than 0")]
    InvalidCacheTtl,

    #[error("tree max_depth and max_nodes must be greater than 0, got {max_depth} and {max_nodes}")]
    InvalidTreeLimits { max_depth: usize, max_nodes: usize },

    #[error("session duration_hours must be between 1 and 8760, got {0}")]
    InvalidSessionDuration(u64),

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Main configuration structure for the DirGate gateway.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// General daemon configuration.
    pub daemon: DaemonConfig,

    /// Allowed roots and path validation.
    pub paths: PathsConfig,

    /// Directory listing pagination.
    pub listing: ListingConfig,

    /// File read limits.
    pub read: ReadConfig,

    /// Directory metadata cache.
    pub cache: CacheConfig,

    /// Bounds for recursive directory walks.
    pub tree: TreeConfig,

    /// Session settings.
    pub session: SessionConfig,

    /// Audit trail settings.
    pub audit: AuditConfig,

    /// Access policies, evaluated in order.
    pub policies: Vec<PolicyDocument>,
}

/// General daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DaemonConfig {
    /// Directory for storing gateway data.
    pub data_dir: PathBuf,

    /// Logging level (trace, debug, info, warn, error).
    pub log_level: String,
}

/// Allowed roots and path validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    /// Ordered list of directories clients may browse. Earlier roots win.
    pub allowed_directories: Vec<PathBuf>,

    /// Characters rejected in client paths.
    pub invalid_chars: String,
}

/// Directory listing pagination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ListingConfig {
    /// Page size used when the client does not pass one.
    pub default_limit: usize,

    /// Largest page size a client may request.
    pub max_limit: usize,
}

/// File read limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReadConfig {
    /// Byte limit used when the client does not pass one.
    pub default_limit: u64,

    /// Largest byte limit a client may request.
    pub max_limit: u64,
}

/// Directory metadata cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached directories.
    pub capacity: usize,

    /// Sliding time-to-live in seconds.
    pub ttl_secs: u64,
}

/// Bounds for recursive directory walks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TreeConfig {
    /// Deepest directory level whose children are loaded.
    pub max_depth: usize,

    /// Maximum number of entries in one tree.
    pub max_nodes: usize,
}

/// Session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Lifetime of newly issued sessions, in hours.
    pub duration_hours: u64,
}

/// Audit trail settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AuditConfig {
    /// JSON-lines audit file. When unset, audit events go to the `audit`
    /// tracing target.
    pub log_file: Option<PathBuf>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: "info".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            allowed_directories: vec![PathBuf::from("/tmp")],
            invalid_chars: DEFAULT_INVALID_CHARS.to_string(),
        }
    }
}

impl Default for ListingConfig {
    fn default() -> Self {
        Self {
            default_limit: 100,
            max_limit: 1000,
        }
    }
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_READ_LIMIT,
            max_limit: MAX_READ_LIMIT,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 128,
            ttl_secs: 300, // 5 minutes
        }
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        let limits = TreeLimits::default();
        Self {
            max_depth: limits.max_depth,
            max_nodes: limits.max_nodes,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { duration_hours: 24 }
    }
}

impl SessionConfig {
    /// Lifetime of newly issued sessions.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_hours.saturating_mul(3600))
    }
}

impl TreeConfig {
    /// Walk limits for the directory browser.
    pub fn limits(&self) -> TreeLimits {
        TreeLimits {
            max_depth: self.max_depth,
            max_nodes: self.max_nodes,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dirgate")
        .join("config.toml")
}

/// Returns the default data directory path.
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("dirgate")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - ALLOWED_DIRECTORIES: comma-separated list of allowed roots
    /// - DIRGATE_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(dirs) = std::env::var("ALLOWED_DIRECTORIES") {
            let roots: Vec<PathBuf> = dirs
                .split(',')
                .map(str::trim)
                .filter(|d| !d.is_empty())
                .map(PathBuf::from)
                .collect();
            if !roots.is_empty() {
                tracing::info!(
                    "Overriding allowed_directories from environment: {:?}",
                    roots
                );
                self.paths.allowed_directories = roots;
            }
        }

        if let Ok(level) = std::env::var("DIRGATE_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.daemon.log_level = level;
            }
        }
    }

    /// Validate the configuration values.
    ///
    /// Returns an error if any configuration value is outside the valid range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.paths.allowed_directories.is_empty() {
            return Err(ConfigError::NoAllowedDirectories);
        }
        if let Some(relative) = self
            .paths
            .allowed_directories
            .iter()
            .find(|d| !d.is_absolute())
        {
            return Err(ConfigError::RelativeAllowedDirectory(relative.clone()));
        }

        let listing = &self.listing;
        if listing.default_limit == 0 || listing.default_limit > listing.max_limit {
            return Err(ConfigError::InvalidListingLimits {
                default: listing.default_limit,
                max: listing.max_limit,
            });
        }

        let read = &self.read;
        if read.default_limit == 0 || read.default_limit > read.max_limit {
            return Err(ConfigError::InvalidReadLimits {
                default: read.default_limit,
                max: read.max_limit,
            });
        }

        if self.cache.capacity == 0 {
            return Err(ConfigError::InvalidCacheCapacity);
        }
        if self.cache.ttl_secs == 0 {
            return Err(ConfigError::InvalidCacheTtl);
        }

        if self.tree.max_depth == 0 || self.tree.max_nodes == 0 {
            return Err(ConfigError::InvalidTreeLimits {
                max_depth: self.tree.max_depth,
                max_nodes: self.tree.max_nodes,
            });
        }

        if self.session.duration_hours == 0 || self.session.duration_hours > 8760 {
            return Err(ConfigError::InvalidSessionDuration(
                self.session.duration_hours,
            ));
        }

        let level = self.daemon.log_level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.daemon.log_level.clone()));
        }

        Ok(())
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    /// If the file exists but is invalid TOML, returns an error with
    /// a helpful message.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}
