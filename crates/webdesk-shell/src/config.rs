//! Shell configuration management.
//!
//! This module handles loading and saving the shell configuration, which
//! includes the backend URL, the last used username and where the session is
//! kept.
//!
//! Configuration is stored at `~/.config/webdesk/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use webdesk_core::ClientConfig;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "webdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// `session.json` in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    pub api_url: Option<String>,
    pub last_username: Option<String>,
    #[serde(default)]
    pub storage: StorageBackend,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
        } else {
            Ok(Self::default())
        }
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

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Saved API URL, then `WEBDESK_*` environment overrides on top
    pub fn client_config(&self) -> Result<ClientConfig> {
        let mut config = ClientConfig::default();
        if let Some(ref url) = self.api_url {
            config.base_url = url.clone();
        }
        config.with_env_overrides()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_backend_defaults_to_file() {
        let config: Config = serde_json::from_str(r#"{"api_url": "https://backend.test"}"#).unwrap();
        assert_eq!(config.storage, StorageBackend::File);
        assert_eq!(config.last_username, None);

        let config: Config = serde_json::from_str(r#"{"storage": "keyring"}"#).unwrap();
        assert_eq!(config.storage, StorageBackend::Keyring);
    }
}
