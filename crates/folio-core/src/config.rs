//! Application configuration management.
//!
//! This module handles loading and saving the client configuration: the API
//! base URL, timeouts for login and refresh, how expired tokens are handled,
//! where credentials are persisted, and the navigation targets used by the
//! route guards.
//!
//! Configuration is stored at `~/.config/folio/config.json`.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "folio";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable that overrides the configured API base URL
pub const API_URL_ENV: &str = "FOLIO_API_URL";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8080/api";

/// HTTP request timeout in seconds for ordinary API calls.
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Login and refresh must fail fast; a hung refresh blocks every waiting request.
const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 15;
const DEFAULT_REFRESH_TIMEOUT_SECS: u64 = 15;

/// Floor for every configured timeout; zero would fail each call instantly.
const MIN_TIMEOUT_SECS: u64 = 1;

/// What the request authorizer does with a request whose access token has
/// already expired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiredPolicy {
    /// Try the refresh token first; an expired access token is recoverable.
    #[default]
    Refresh,
    /// End the session and deny the request.
    Terminate,
}

/// Which credential backend the session persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Process lifetime only
    Memory,
    /// `session.json` in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub login_timeout_secs: u64,
    pub refresh_timeout_secs: u64,
    pub expired_policy: ExpiredPolicy,
    pub storage: StorageKind,
    pub login_path: String,
    /// Neutral route unauthorized principals are sent to
    pub denied_path: String,
    pub home_path: String,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            login_timeout_secs: DEFAULT_LOGIN_TIMEOUT_SECS,
            refresh_timeout_secs: DEFAULT_REFRESH_TIMEOUT_SECS,
            expired_policy: ExpiredPolicy::default(),
            storage: StorageKind::default(),
            login_path: "/login".to_string(),
            denied_path: "/".to_string(),
            home_path: "/dashboard".to_string(),
            last_email: None,
        }
    }
}

impl Config {
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
                self.api_base_url = url.trim().to_string();
            }
        }
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

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(MIN_TIMEOUT_SECS))
    }

    pub fn login_timeout(&self) -> Duration {
        Duration::from_secs(self.login_timeout_secs.max(MIN_TIMEOUT_SECS))
    }

    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_secs(self.refresh_timeout_secs.max(MIN_TIMEOUT_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let json = r#"{"api_base_url": "https://folio.example.com/api", "expired_policy": "terminate"}"#;
        let config: Config = serde_json::from_str(json).expect("Failed to parse config");
        assert_eq!(config.api_base_url, "https://folio.example.com/api");
        assert_eq!(config.expired_policy, ExpiredPolicy::Terminate);
        assert_eq!(config.storage, StorageKind::File);
        assert_eq!(config.refresh_timeout(), Duration::from_secs(15));
        assert_eq!(config.login_path, "/login");
    }

    #[test]
    fn test_timeouts_are_finite() {
        let config = Config::default();
        assert!(config.login_timeout() > Duration::ZERO);
        assert!(config.refresh_timeout() > Duration::ZERO);
        assert!(config.request_timeout() >= config.refresh_timeout());
    }

    #[test]
    fn test_zero_timeouts_are_clamped() {
        let json = r#"{"login_timeout_secs": 0, "refresh_timeout_secs": 0, "request_timeout_secs": 0}"#;
        let config: Config = serde_json::from_str(json).expect("Failed to parse config");
        assert_eq!(config.login_timeout(), Duration::from_secs(MIN_TIMEOUT_SECS));
        assert_eq!(config.refresh_timeout(), Duration::from_secs(MIN_TIMEOUT_SECS));
        assert_eq!(config.request_timeout(), Duration::from_secs(MIN_TIMEOUT_SECS));
    }
}
