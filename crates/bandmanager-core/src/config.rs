//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! the backend URL, where credentials are persisted, and the last used
//! username.
//!
//! Configuration is stored at `~/.config/bandmanager/config.json`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::api::client::REQUEST_TIMEOUT_SECS;
use crate::auth::{FileStorage, KeyValueStore, KeyringStorage, MemoryStorage};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "bandmanager";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Credentials file name for the file storage backend
const CREDENTIALS_FILE: &str = "credentials.json";

/// Environment variable overriding `api_url`
pub const API_URL_ENV: &str = "BANDMANAGER_API_URL";

/// Backend URL used when nothing is configured
const DEFAULT_API_URL: &str = "http://localhost:8080/api";

/// Where the credential pair is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Keyring,
    File,
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub storage: StorageBackend,
    pub last_username: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            storage: StorageBackend::default(),
            last_username: None,
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load the config file (or defaults), then apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str(&contents)?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                self.api_url = url;
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir =
            dirs::data_dir().ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// The storage backend this config selects.
    pub fn open_storage(&self) -> Result<Arc<dyn KeyValueStore>> {
        let storage: Arc<dyn KeyValueStore> = match self.storage {
            StorageBackend::Keyring => Arc::new(KeyringStorage::new()),
            StorageBackend::File => Arc::new(FileStorage::new(
                self.data_dir()?.join(CREDENTIALS_FILE),
            )),
            StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        };
        Ok(storage)
    }
}
