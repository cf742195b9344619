//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, where credentials are stored, whether refresh tokens are used,
//! and the last email used to sign in.
//!
//! Configuration is stored at `~/.config/articulink/config.json`. Environment
//! variables (`ARTICULINK_API_URL`, `ARTICULINK_STORAGE`,
//! `ARTICULINK_REFRESH_TOKENS`) override the file.

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::client::DEFAULT_REQUEST_TIMEOUT_SECS;
use crate::auth::store::{FileStore, KeyValueStore, KeyringStore, MemoryStore};

/// Application name used for config/data directory paths and the keychain service
const APP_NAME: &str = "articulink";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Credential file name in the data directory
const CREDENTIALS_FILE: &str = "credentials.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api/v1";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" | "keychain" => Ok(StorageBackend::Keyring),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub storage: StorageBackend,
    pub refresh_tokens: bool,
    pub request_timeout_secs: u64,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            storage: StorageBackend::default(),
            refresh_tokens: true,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            last_email: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok());
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

    /// Apply overrides from a variable lookup (the process environment in
    /// production). Invalid values are logged and ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("ARTICULINK_API_URL").filter(|v| !v.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(storage) = lookup("ARTICULINK_STORAGE") {
            match storage.parse() {
                Ok(backend) => self.storage = backend,
                Err(e) => warn!(error = %e, "Ignoring ARTICULINK_STORAGE"),
            }
        }
        if let Some(flag) = lookup("ARTICULINK_REFRESH_TOKENS") {
            match flag.trim().to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.refresh_tokens = true,
                "0" | "false" | "no" | "off" => self.refresh_tokens = false,
                other => warn!(value = other, "Ignoring ARTICULINK_REFRESH_TOKENS"),
            }
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Open the configured credential store.
    pub fn open_store(&self) -> Result<Arc<dyn KeyValueStore>> {
        let store: Arc<dyn KeyValueStore> = match self.storage {
            StorageBackend::File => {
                Arc::new(FileStore::new(self.data_dir()?.join(CREDENTIALS_FILE)))
            }
            StorageBackend::Keyring => Arc::new(KeyringStore::new(APP_NAME)),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        };
        Ok(store)
    }
}
