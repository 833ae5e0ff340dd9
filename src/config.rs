//! Configuration for the classroom-pulse server and clients.

use crate::core::HubConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Main configuration shared by the server and the client commands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Address the server binds to
    pub host: String,
    pub port: u16,

    /// Base URL client commands talk to
    pub server_url: String,

    /// Cadence of the client capture loop
    #[serde(with = "duration_serde")]
    pub capture_interval: Duration,

    /// Upper bound on a single submission before the tick counts as failed
    #[serde(with = "duration_serde")]
    pub submit_timeout: Duration,

    /// Dashboard snapshot poll interval
    #[serde(with = "duration_serde")]
    pub poll_interval: Duration,

    /// Age after which a student's last sample is flagged stale
    #[serde(with = "duration_serde")]
    pub stale_after: Duration,

    /// Timeout for ordinary HTTP requests
    #[serde(with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            server_url: "http://127.0.0.1:5000".to_string(),
            capture_interval: Duration::from_secs(5),
            submit_timeout: Duration::from_secs(4),
            poll_interval: Duration::from_secs(3),
            stale_after: Duration::from_secs(30),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl Config {
    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Load configuration from `path`, falling back to defaults if it is absent.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Save configuration to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("classroom-pulse")
            .join("config.json")
    }

    /// Hub settings derived from this configuration.
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            capture_interval: self.capture_interval,
            stale_after: self.stale_after,
        }
    }
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(serde_json::Error),
    #[error("Serialize error: {0}")]
    Serialize(serde_json::Error),
}

/// Serde support for Duration as whole seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
