//! Configuration file support for bibget.
//!
//! # Configuration File Format
//!
//! ```toml
//! [scopus]
//! api_key = "your-elsevier-api-key"
//! rate_limit = 6
//!
//! [sources]
//! mathscinet = true
//!
//! [http]
//! timeout_seconds = 10
//!
//! [logging]
//! level = "warn"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::DEFAULT_TIMEOUT_SECS;

/// Configuration file structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Scopus section
    #[serde(default)]
    pub scopus: ScopusConfig,

    /// Sources section
    #[serde(default)]
    pub sources: SourcesConfig,

    /// HTTP section
    #[serde(default)]
    pub http: HttpConfig,

    /// Logging section
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scopus configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopusConfig {
    /// Elsevier API key; empty means Scopus is not used
    #[serde(default)]
    pub api_key: String,

    /// Requests per second allowed by the API quota
    #[serde(default = "default_rate_limit")]
    pub rate_limit: u32,
}

impl Default for ScopusConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            rate_limit: default_rate_limit(),
        }
    }
}

fn default_rate_limit() -> u32 {
    6
}

/// Sources configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourcesConfig {
    /// Try MathSciNet for DOIs and when updating
    #[serde(default = "default_true")]
    pub mathscinet: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self { mathscinet: true }
    }
}

fn default_true() -> bool {
    true
}

/// HTTP configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Settings {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigFileError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io(e.to_string()))?;

        toml::from_str(&content).map_err(|e| ConfigFileError::Parse(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories
    pub fn save(&self, path: &Path) -> Result<(), ConfigFileError> {
        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigFileError::Serialize(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ConfigFileError::Io(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| ConfigFileError::Io(e.to_string()))
    }

    /// The Scopus API key, if one is configured
    pub fn api_key(&self) -> Option<&str> {
        let key = self.scopus.api_key.trim();
        (!key.is_empty()).then_some(key)
    }
}

/// Configuration file errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}
