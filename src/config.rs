//! Configuration loading and persistence.
//!
//! Settings live in `config.json` under the platform config directory
//! (`CONVWATCH_CONFIG_DIR` overrides it). Environment variables override
//! file values; command-line flags override both.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::channel::HandshakeVariant;
use crate::constants::{
    APP_DIR_NAME, CONFIG_FILE_NAME, DEFAULT_SERVER_URL, ENV_CAPTCHA_DIR, ENV_CONFIG_DIR,
    ENV_HANDSHAKE, ENV_URL,
};

/// Configuration for the convwatch CLI.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Event endpoint. May contain `{ticket}` for the ready handshake.
    pub server_url: String,
    /// Handshake the endpoint speaks.
    pub handshake: HandshakeVariant,
    /// Where to save captcha images so they can be opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub captcha_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            handshake: HandshakeVariant::Ready,
            captcha_dir: None,
        }
    }
}

impl Config {
    /// Returns the configuration directory path.
    ///
    /// `CONVWATCH_CONFIG_DIR` wins over the platform config directory.
    pub fn config_dir() -> Result<PathBuf> {
        if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
            return Ok(PathBuf::from(dir));
        }
        Ok(dirs::config_dir()
            .context("Could not determine config directory")?
            .join(APP_DIR_NAME))
    }

    /// Path of the config file.
    pub fn path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from file, with environment variable overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_dir()?)?;
        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load `config.json` from `dir`, falling back to defaults when absent.
    ///
    /// A file that exists but cannot be parsed is an error.
    pub fn load_from(dir: &Path) -> Result<Self> {
        let path = dir.join(CONFIG_FILE_NAME);
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        serde_json::from_str(&content).with_context(|| format!("Invalid config {}", path.display()))
    }

    /// Apply overrides from `lookup` (the process environment in production).
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_URL) {
            self.server_url = url;
        }

        if let Some(handshake) = lookup(ENV_HANDSHAKE) {
            match handshake.parse() {
                Ok(variant) => self.handshake = variant,
                Err(e) => log::warn!("Ignoring {}: {}", ENV_HANDSHAKE, e),
            }
        }

        if let Some(dir) = lookup(ENV_CAPTCHA_DIR) {
            self.captcha_dir = (!dir.is_empty()).then(|| PathBuf::from(dir));
        }
    }

    /// Persists the current configuration to the config directory.
    pub fn save(&self) -> Result<PathBuf> {
        self.save_to(&Self::config_dir()?)
    }

    /// Write `config.json` into `dir`, creating it if needed.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(CONFIG_FILE_NAME);
        fs::write(&path, serde_json::to_string_pretty(self)?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server_url, "ws://localhost:8085/ws/inter/{ticket}");
        assert_eq!(config.handshake, HandshakeVariant::Ready);
        assert!(config.captcha_dir.is_none());
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(Config::load_from(dir.path()).unwrap(), Config::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            server_url: "wss://conv.example.com/ws/converter".to_string(),
            handshake: HandshakeVariant::TicketPush,
            captcha_dir: Some(PathBuf::from("/tmp/captchas")),
        };

        let path = config.save_to(&dir.path().join("nested")).unwrap();

        assert!(path.ends_with("nested/config.json"));
        let json = fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"ticket-push\""));
        assert_eq!(Config::load_from(&dir.path().join("nested")).unwrap(), config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"handshake": "ticket-push"}"#,
        )
        .unwrap();

        let config = Config::load_from(dir.path()).unwrap();

        assert_eq!(config.handshake, HandshakeVariant::TicketPush);
        assert_eq!(config.server_url, DEFAULT_SERVER_URL);
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "{ nope").unwrap();
        assert!(Config::load_from(dir.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[
            ("CONVWATCH_URL", "ws://other:9000/ws/watcher"),
            ("CONVWATCH_HANDSHAKE", "ticket-push"),
            ("CONVWATCH_CAPTCHA_DIR", "/var/tmp/cw"),
        ]));

        assert_eq!(config.server_url, "ws://other:9000/ws/watcher");
        assert_eq!(config.handshake, HandshakeVariant::TicketPush);
        assert_eq!(config.captcha_dir, Some(PathBuf::from("/var/tmp/cw")));
    }

    #[test]
    fn test_bad_handshake_override_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(env(&[("CONVWATCH_HANDSHAKE", "smoke-signals")]));
        assert_eq!(config.handshake, HandshakeVariant::Ready);
    }
}
