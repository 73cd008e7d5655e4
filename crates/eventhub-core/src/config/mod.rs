//! Configuration management with file persistence

use anyhow::{Context, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;

/// Default backend endpoint
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";

/// Environment variable overriding the config directory
pub const CONFIG_DIR_ENV: &str = "EVENTHUB_CONFIG_DIR";

/// Environment variable overriding `api.base_url`
pub const API_URL_ENV: &str = "EVENTHUB_API_URL";

/// Eventhub configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// One of `file`, `keyring` or `memory`
    pub backend: String,
    /// Session file for the `file` backend. Defaults to `session.json` in
    /// the config directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

const STORAGE_BACKENDS: [&str; 3] = ["file", "keyring", "memory"];

impl Default for Config {
    fn default() -> Self {
        Self {
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout_secs: 30,
            },
            storage: StorageConfig {
                backend: "file".to_string(),
                path: None,
            },
        }
    }
}

impl StorageConfig {
    /// Path of the session file used by the `file` backend
    pub fn session_path(&self) -> anyhow::Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(Config::config_dir()?.join("session.json")),
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> anyhow::Result<PathBuf> {
        let dir = if let Ok(custom_dir) = env::var(CONFIG_DIR_ENV) {
            PathBuf::from(custom_dir)
        } else {
            dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not determine config directory"))?
                .join("eventhub")
        };
        Ok(dir)
    }

    /// Get the config file path
    pub fn config_path() -> anyhow::Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load configuration from file, or the defaults if it doesn't exist.
    ///
    /// `EVENTHUB_API_URL` wins over the file.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_file()?;

        if let Ok(url) = env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api.base_url = url;
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only what is on disk, ignoring environment overrides
    pub fn load_file() -> anyhow::Result<Self> {
        let path = Self::config_path()?;

        let config: Config = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Config::default()
        };

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> anyhow::Result<()> {
        self.validate()?;

        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;

        let path = Self::config_path()?;
        let contents = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        let url = self.api.base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(anyhow!(
                "api.base_url must start with http:// or https://, got '{}'",
                self.api.base_url
            ));
        }
        if self.api.timeout_secs == 0 {
            return Err(anyhow!("api.timeout_secs must be greater than zero"));
        }
        if !STORAGE_BACKENDS.contains(&self.storage.backend.as_str()) {
            return Err(anyhow!(
                "Invalid storage backend: {}. Valid options: {}",
                self.storage.backend,
                STORAGE_BACKENDS.join(", ")
            ));
        }
        Ok(())
    }

    /// Get a configuration value by key
    pub fn get(&self, key: &str) -> anyhow::Result<String> {
        match key {
            "api.base_url" => Ok(self.api.base_url.clone()),
            "api.timeout_secs" => Ok(self.api.timeout_secs.to_string()),
            "storage.backend" => Ok(self.storage.backend.clone()),
            "storage.path" => Ok(self
                .storage
                .session_path()?
                .display()
                .to_string()),
            _ => Err(anyhow!(
                "Unknown configuration key: {}. Use `eventhub config list` to see available keys.",
                key
            )),
        }
    }

    /// Set a configuration value by key
    pub fn set(&mut self, key: &str, value: &str) -> anyhow::Result<()> {
        match key {
            "api.base_url" => {
                let url = value.trim().trim_end_matches('/');
                if !(url.starts_with("http://") || url.starts_with("https://")) {
                    return Err(anyhow!("Base URL must start with http:// or https://"));
                }
                self.api.base_url = url.to_string();
            }
            "api.timeout_secs" => {
                let secs: u64 = value
                    .parse()
                    .with_context(|| format!("Invalid timeout_secs value: {}", value))?;
                if secs == 0 {
                    return Err(anyhow!("Timeout must be greater than zero"));
                }
                self.api.timeout_secs = secs;
            }
            "storage.backend" => {
                if !STORAGE_BACKENDS.contains(&value) {
                    return Err(anyhow!(
                        "Invalid storage backend: {}. Valid options: {}",
                        value,
                        STORAGE_BACKENDS.join(", ")
                    ));
                }
                self.storage.backend = value.to_string();
            }
            "storage.path" => {
                self.storage.path = if value.trim().is_empty() {
                    None
                } else {
                    Some(PathBuf::from(value))
                };
            }
            _ => {
                return Err(anyhow!(
                    "Unknown configuration key: {}. Use `eventhub config list` to see available keys.",
                    key
                ));
            }
        }
        Ok(())
    }

    /// List all configuration keys and their values
    pub fn list(&self) -> anyhow::Result<Vec<(String, String)>> {
        let keys = [
            "api.base_url",
            "api.timeout_secs",
            "storage.backend",
            "storage.path",
        ];

        keys.into_iter()
            .map(|key| {
                let value = self.get(key)?;
                Ok((key.to_string(), value))
            })
            .collect()
    }

    /// Reset configuration to defaults
    pub fn reset() -> anyhow::Result<()> {
        let path = Self::config_path()?;
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove config file: {}", path.display()))?;
        }
        Ok(())
    }
}
