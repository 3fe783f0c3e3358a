//! # ugidx-config
//!
//! Configuration management for the ugidx content indexer.
//!
//! Loads configuration from:
//! 1. `~/.ugidx/config.toml` (global)
//! 2. `.ugidx/config.toml` (project-local, overrides global)
//! 3. Environment variables (highest priority)
//!
//! Command-line flags are applied on top by the binary. The resulting
//! [`Config`] is validated once and then passed by reference into the
//! indexer; nothing in the engine reads process-wide settings.

pub mod logging;
pub mod path;
pub mod testing;

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// Highest accuracy level accepted by the fingerprint builder.
pub const MAX_ACCURACY: u8 = 9;

/// Default accuracy level when nothing else is configured.
pub const DEFAULT_ACCURACY: u8 = 4;

/// Upper bound for nested decompression.
pub const MAX_DECOMPRESS_DEPTH: u8 = 99;

/// Default ignore-rules file looked up while descending.
pub const DEFAULT_IGNORE_FILE: &str = ".gitignore";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub index: IndexConfig,
    pub walk: WalkConfig,
    pub decompress: DecompressConfig,
}

impl Config {
    /// Load config from standard locations
    pub fn load() -> Result<Self> {
        let global = path::global_config_path();
        let project = path::project_config_path();
        let mut config = Self::load_from(global.as_deref(), Some(&project))?;

        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load config from explicit global and project files.
    ///
    /// Missing files are skipped. Tables are merged key by key so a project
    /// file only needs to name the settings it changes.
    pub fn load_from(global: Option<&Path>, project: Option<&Path>) -> Result<Self> {
        let mut table = toml::Table::new();

        for path in [global, project].into_iter().flatten() {
            if path.exists() {
                debug!("Loading config from {:?}", path);
                let contents = std::fs::read_to_string(path)?;
                let overlay: toml::Table = toml::from_str(&contents)?;
                merge_tables(&mut table, overlay);
            }
        }

        let config: Config = toml::Value::Table(table).try_into()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup (environment in production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(accuracy) = lookup("UGIDX_ACCURACY") {
            self.index.accuracy = accuracy.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("UGIDX_ACCURACY is not a digit: {:?}", accuracy))
            })?;
        }
        if let Some(files) = lookup("UGIDX_IGNORE_FILES") {
            self.walk.ignore_files = files
                .split(',')
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.index.accuracy > MAX_ACCURACY {
            return Err(ConfigError::Invalid(format!(
                "accuracy must be between 0 and {}, got {}",
                MAX_ACCURACY, self.index.accuracy
            )));
        }
        if !(1..=MAX_DECOMPRESS_DEPTH).contains(&self.decompress.max_depth) {
            return Err(ConfigError::Invalid(format!(
                "decompression depth must be between 1 and {}, got {}",
                MAX_DECOMPRESS_DEPTH, self.decompress.max_depth
            )));
        }
        if let Some(bad) = self
            .walk
            .ignore_files
            .iter()
            .find(|name| name.is_empty() || name.contains('/'))
        {
            return Err(ConfigError::Invalid(format!(
                "ignore file must be a plain file name, got {:?}",
                bad
            )));
        }
        Ok(())
    }

    /// Generate the TOML form of this config
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    /// Generate default config TOML string
    pub fn default_toml() -> String {
        Config::default().to_toml()
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

/// Fingerprint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// 0 (smallest tables, most false positives) to 9 (largest tables)
    pub accuracy: u8,
    /// Record binary files without a fingerprint
    pub skip_binary: bool,
    /// Ignore existing index files and rebuild every directory
    pub force: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            accuracy: DEFAULT_ACCURACY,
            skip_binary: false,
            force: false,
        }
    }
}

/// Traversal settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WalkConfig {
    /// Index hidden files and descend into hidden directories
    pub hidden: bool,
    /// Follow symbolic links to files (links to directories are never followed)
    pub dereference_files: bool,
    /// Names of gitignore-style rule files honoured while descending
    pub ignore_files: Vec<String>,
}

impl Default for WalkConfig {
    fn default() -> Self {
        Self {
            hidden: false,
            dereference_files: false,
            ignore_files: vec![DEFAULT_IGNORE_FILE.to_string()],
        }
    }
}

/// Decompression settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompressConfig {
    /// Index the decompressed content of gzip and zip files
    pub enabled: bool,
    /// Nesting limit: 1 = outer container only
    pub max_depth: u8,
}

impl Default for DecompressConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_depth: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.index.accuracy, DEFAULT_ACCURACY);
        assert_eq!(config.walk.ignore_files, vec![".gitignore"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(toml_str.contains("[index]"));
        assert!(toml_str.contains("[walk]"));
        assert!(toml_str.contains("[decompress]"));
        assert!(toml_str.contains(".gitignore"));
    }

    #[test]
    fn test_toml_roundtrip() {
        let config = Config::default();
        let parsed: Config = toml::from_str(&config.to_toml()).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_validate_rejects_accuracy_out_of_range() {
        let mut config = Config::default();
        config.index.accuracy = 10;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_validate_rejects_depth_out_of_range() {
        let mut config = Config::default();
        config.decompress.max_depth = 0;
        assert!(config.validate().is_err());
        config.decompress.max_depth = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nested_ignore_file() {
        let mut config = Config::default();
        config.walk.ignore_files = vec!["sub/.gitignore".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("UGIDX_ACCURACY", "7"),
            ("UGIDX_IGNORE_FILES", ".gitignore, .ignore,"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.index.accuracy, 7);
        assert_eq!(config.walk.ignore_files, vec![".gitignore", ".ignore"]);
    }

    #[test]
    fn test_override_with_garbage_accuracy_fails() {
        let mut config = Config::default();
        let result = config.apply_overrides(|key| {
            (key == "UGIDX_ACCURACY").then(|| "high".to_string())
        });
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_merge_tables_is_deep() {
        let mut base: toml::Table = toml::from_str("[index]\naccuracy = 2\nskip_binary = true").unwrap();
        let overlay: toml::Table = toml::from_str("[index]\naccuracy = 8").unwrap();
        merge_tables(&mut base, overlay);
        let config: Config = toml::Value::Table(base).try_into().unwrap();
        assert_eq!(config.index.accuracy, 8);
        assert!(config.index.skip_binary);
    }
}
