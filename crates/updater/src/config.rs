//! Persisted client configuration (`config/updater.json`).
//!
//! Mirrors the key/value store the original updater kept next to its
//! executable: every field has a default so a config file missing newer keys
//! still loads, and every write re-reads the file first so unrelated fields
//! already on disk aren't clobbered.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

fn default_version() -> String {
    "1.0.0".to_string()
}

fn default_launcher_version() -> String {
    "0.0.1".to_string()
}

fn default_game_directory() -> String {
    "./.minecraft".to_string()
}

fn default_log_file() -> String {
    "./logs/updater.log".to_string()
}

fn default_update_mode() -> String {
    "version".to_string()
}

fn default_hash_algorithm() -> String {
    "md5".to_string()
}

fn default_true() -> bool {
    true
}

fn default_api_timeout() -> u64 {
    60
}

/// On-disk configuration, read and written as `config/updater.json`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Settings {
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default = "default_launcher_version")]
    pub launcher_version: String,
    #[serde(default)]
    pub update_url: String,
    #[serde(default = "default_game_directory")]
    pub game_directory: String,
    #[serde(default = "default_true")]
    pub auto_update: bool,
    #[serde(default = "default_log_file")]
    pub log_file: String,
    #[serde(default = "default_update_mode")]
    pub update_mode: String,
    #[serde(default = "default_hash_algorithm")]
    pub hash_algorithm: String,
    #[serde(default = "default_true")]
    pub enable_file_deletion: bool,
    #[serde(default)]
    pub skip_major_version_check: bool,
    #[serde(default = "default_true")]
    pub enable_api_cache: bool,
    #[serde(default = "default_api_timeout")]
    pub api_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            version: default_version(),
            launcher_version: default_launcher_version(),
            update_url: String::new(),
            game_directory: default_game_directory(),
            auto_update: true,
            log_file: default_log_file(),
            update_mode: default_update_mode(),
            hash_algorithm: default_hash_algorithm(),
            enable_file_deletion: true,
            skip_major_version_check: false,
            enable_api_cache: true,
            api_timeout: default_api_timeout(),
        }
    }
}

impl Settings {
    /// Validate that the fields required for a run are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.update_url.trim().is_empty() {
            return Err(ConfigError::MissingUpdateUrl);
        }
        if self.game_directory.trim().is_empty() {
            return Err(ConfigError::MissingGameDirectory);
        }
        Ok(())
    }
}

/// Handle to a config file on disk. Each write re-reads the file to avoid
/// dropping fields this process doesn't know about.
pub struct ConfigManager {
    path: PathBuf,
}

impl ConfigManager {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConfigManager { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Write the default configuration, creating the parent directory.
    pub fn initialize_default(&self) -> Result<Settings, ConfigError> {
        let settings = Settings::default();
        self.write(&settings)?;
        Ok(settings)
    }

    pub fn read(&self) -> Result<Settings, ConfigError> {
        let text =
            std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Read {
                path: self.path.clone(),
                source,
            })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })
    }

    pub fn write(&self, settings: &Settings) -> Result<(), ConfigError> {
        self.ensure_parent()?;
        let json = serde_json::to_string_pretty(settings).map_err(|source| ConfigError::Parse {
            path: self.path.clone(),
            source,
        })?;
        std::fs::write(&self.path, json).map_err(|source| ConfigError::Write {
            path: self.path.clone(),
            source,
        })
    }

    /// Persist just the local game version, preserving every other field.
    pub fn write_version(&self, version: &str) -> Result<(), ConfigError> {
        let mut settings = self.read()?;
        settings.version = version.to_string();
        self.write(&settings)
    }

    /// Persist just the launcher version, preserving every other field.
    pub fn write_launcher_version(&self, version: &str) -> Result<(), ConfigError> {
        let mut settings = self.read()?;
        settings.launcher_version = version.to_string();
        self.write(&settings)
    }

    fn ensure_parent(&self) -> Result<(), ConfigError> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                std::fs::create_dir_all(dir).map_err(|source| ConfigError::Write {
                    path: self.path.clone(),
                    source,
                })?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_settings_match_documented_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.version, "1.0.0");
        assert_eq!(settings.launcher_version, "0.0.1");
        assert_eq!(settings.game_directory, "./.minecraft");
        assert!(settings.auto_update);
        assert_eq!(settings.update_mode, "version");
        assert_eq!(settings.hash_algorithm, "md5");
        assert!(settings.enable_file_deletion);
        assert!(!settings.skip_major_version_check);
        assert!(settings.enable_api_cache);
        assert_eq!(settings.api_timeout, 60);
    }

    #[test]
    fn missing_update_url_and_game_directory_are_fatal() {
        let mut settings = Settings::default();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingUpdateUrl)
        ));
        settings.update_url = "https://example.com/manifest.json".into();
        settings.game_directory.clear();
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::MissingGameDirectory)
        ));
    }

    #[test]
    fn write_then_read_round_trips_and_preserves_unrelated_fields() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("config/updater.json"));
        let mut settings = manager.initialize_default().unwrap();
        settings.update_url = "https://cdn.example.com/manifest.json".into();
        manager.write(&settings).unwrap();

        manager.write_version("1.2.3").unwrap();
        let reloaded = manager.read().unwrap();
        assert_eq!(reloaded.version, "1.2.3");
        assert_eq!(reloaded.update_url, "https://cdn.example.com/manifest.json");
    }
}
