//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the backend URL, the allowed email, where the credential
//! slot lives, the last signed-in principal and the lifecycle timings.
//!
//! Configuration is stored at `~/.config/bookshelf/config.json`. The
//! `BOOKSHELF_BACKEND_URL` and `BOOKSHELF_ALLOWED_EMAIL` environment
//! variables override the file.

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::api::{AccessPolicy, DEFAULT_BACKEND_URL};
use crate::auth::{LifecycleConfig, Principal};
use crate::slot::file::SLOT_FILE;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "bookshelf";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const ENV_BACKEND_URL: &str = "BOOKSHELF_BACKEND_URL";
pub const ENV_ALLOWED_EMAIL: &str = "BOOKSHELF_ALLOWED_EMAIL";

/// Where the persisted credential lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotBackend {
    /// A file in the cache directory, shared by every process.
    #[default]
    File,
    /// The OS keychain.
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub backend_url: Option<String>,
    pub allowed_email: Option<String>,
    pub slot_backend: SlotBackend,
    /// Overrides the default `<cache>/bookshelf/jwt-token` location.
    pub slot_path: Option<PathBuf>,
    pub last_principal: Option<Principal>,
    pub lifecycle: LifecycleConfig,
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };
        config.apply_env(|key| std::env::var(key).ok());
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

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        if let Some(url) = non_empty(ENV_BACKEND_URL) {
            self.backend_url = Some(url);
        }
        if let Some(email) = non_empty(ENV_ALLOWED_EMAIL) {
            self.allowed_email = Some(email);
        }
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    pub fn slot_path(&self) -> Result<PathBuf> {
        match &self.slot_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.cache_dir()?.join(SLOT_FILE)),
        }
    }

    pub fn backend_url(&self) -> &str {
        self.backend_url.as_deref().unwrap_or(DEFAULT_BACKEND_URL)
    }

    pub fn access_policy(&self) -> AccessPolicy {
        AccessPolicy {
            allowed_email: self.allowed_email.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_json_uses_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.slot_backend, SlotBackend::File);
        assert_eq!(config.lifecycle, LifecycleConfig::default());
        assert_eq!(config.backend_url(), DEFAULT_BACKEND_URL);
        assert_eq!(config.access_policy(), AccessPolicy::default());
    }

    #[test]
    fn test_partial_lifecycle_keeps_other_defaults() {
        let config: Config =
            serde_json::from_str(r#"{"slot_backend":"keyring","lifecycle":{"expiry_skew_secs":30}}"#)
                .unwrap();
        assert_eq!(config.slot_backend, SlotBackend::Keyring);
        assert_eq!(config.lifecycle.expiry_skew_secs, 30);
        assert_eq!(config.lifecycle.settle_delay_ms, 500);
        assert_eq!(config.lifecycle.check_interval_secs, 5);
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config {
            backend_url: Some("http://file".to_string()),
            ..Config::default()
        };
        config.apply_env(|key| match key {
            ENV_BACKEND_URL => Some("http://env:5000".to_string()),
            ENV_ALLOWED_EMAIL => Some("  ".to_string()),
            _ => None,
        });
        assert_eq!(config.backend_url(), "http://env:5000");
        assert_eq!(config.allowed_email, None);
    }

    #[test]
    fn test_explicit_slot_path_wins() {
        let config = Config {
            slot_path: Some(PathBuf::from("/tmp/shared-token")),
            ..Config::default()
        };
        assert_eq!(config.slot_path().unwrap(), PathBuf::from("/tmp/shared-token"));
    }

    #[test]
    fn test_config_roundtrips_principal() {
        let config = Config {
            last_principal: Some(Principal::new("uid-1").with_email("owner@example.com")),
            ..Config::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.last_principal, config.last_principal);
    }
}
