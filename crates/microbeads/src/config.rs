//! Configuration file loading and parsing.
//!
//! The store is configured through `<store>/config.toml`. Every section is
//! optional; if no config file exists, the system falls back to defaults.

use crate::id_gen::{DEFAULT_PREFIX, DEFAULT_SUFFIX_LEN};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE: &str = "config.toml";

/// Root configuration structure loaded from `config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Identifier generation (optional).
    pub ids: Option<IdsConfig>,
    /// Dependency validation (optional).
    pub dependencies: Option<DependenciesConfig>,
    /// Read-through record cache (optional).
    pub cache: Option<CacheConfig>,
    /// Log filtering (optional).
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdsConfig {
    /// Identifier prefix (default: "bd").
    pub prefix: Option<String>,
    /// Random suffix length in hex characters (default: 8).
    pub length: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependenciesConfig {
    /// Refuse `dep add` edges that would close a cycle (default: true).
    pub reject_cycles: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Serve full scans from `cache.json` (default: false).
    pub enabled: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default log filter directive (default: "warn").
    pub level: Option<String>,
}

impl TrackerConfig {
    /// Load configuration from `<root>/config.toml` if it exists.
    ///
    /// Returns an empty config (all fields None) if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE);

        if !config_path.exists() {
            return Ok(TrackerConfig::default());
        }

        let content =
            std::fs::read_to_string(&config_path).context("Failed to read config.toml")?;
        let config: TrackerConfig =
            toml::from_str(&content).context("Failed to parse config.toml")?;

        Ok(config)
    }

    /// A config with every value spelled out, for `init`.
    pub fn with_prefix(prefix: &str) -> Self {
        Self {
            ids: Some(IdsConfig {
                prefix: Some(prefix.to_string()),
                length: Some(DEFAULT_SUFFIX_LEN),
            }),
            dependencies: Some(DependenciesConfig {
                reject_cycles: Some(true),
            }),
            cache: Some(CacheConfig {
                enabled: Some(false),
            }),
            logging: Some(LoggingConfig {
                level: Some("warn".to_string()),
            }),
        }
    }

    /// Write this config to `<root>/config.toml` unless one already exists.
    ///
    /// Returns whether a file was written.
    pub fn write_if_missing(&self, root: &Path) -> Result<bool> {
        let config_path = root.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(false);
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, content).context("Failed to write config.toml")?;
        Ok(true)
    }

    pub fn id_prefix(&self) -> String {
        self.ids
            .as_ref()
            .and_then(|ids| ids.prefix.clone())
            .unwrap_or_else(|| DEFAULT_PREFIX.to_string())
    }

    pub fn id_length(&self) -> usize {
        self.ids
            .as_ref()
            .and_then(|ids| ids.length)
            .unwrap_or(DEFAULT_SUFFIX_LEN)
    }

    pub fn reject_cycles(&self) -> bool {
        self.dependencies
            .as_ref()
            .and_then(|deps| deps.reject_cycles)
            .unwrap_or(true)
    }

    pub fn cache_enabled(&self) -> bool {
        self.cache
            .as_ref()
            .and_then(|cache| cache.enabled)
            .unwrap_or(false)
    }

    pub fn log_level(&self) -> String {
        self.logging
            .as_ref()
            .and_then(|logging| logging.level.clone())
            .unwrap_or_else(|| "warn".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp = TempDir::new().unwrap();
        let config = TrackerConfig::load(temp.path()).unwrap();
        assert_eq!(config.id_prefix(), "bd");
        assert_eq!(config.id_length(), 8);
        assert!(config.reject_cycles());
        assert!(!config.cache_enabled());
        assert_eq!(config.log_level(), "warn");
    }

    #[test]
    fn test_partial_sections() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE),
            "[ids]\nprefix = \"mb\"\n\n[dependencies]\nreject_cycles = false\n",
        )
        .unwrap();

        let config = TrackerConfig::load(temp.path()).unwrap();
        assert_eq!(config.id_prefix(), "mb");
        assert_eq!(config.id_length(), 8);
        assert!(!config.reject_cycles());
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE), "[ids\nprefix = ").unwrap();
        assert!(TrackerConfig::load(temp.path()).is_err());
    }

    #[test]
    fn test_write_if_missing_round_trips_and_keeps_existing() {
        let temp = TempDir::new().unwrap();
        assert!(TrackerConfig::with_prefix("xy")
            .write_if_missing(temp.path())
            .unwrap());
        assert!(!TrackerConfig::with_prefix("zz")
            .write_if_missing(temp.path())
            .unwrap());

        let config = TrackerConfig::load(temp.path()).unwrap();
        assert_eq!(config.id_prefix(), "xy");
        assert!(config.reject_cycles());
    }
}
