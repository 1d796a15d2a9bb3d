//! Configuration management.
//!
//! Settings come from the TOML file (see [`file_config`]) with environment
//! overrides on top: `BIBGET_<SECTION>__<KEY>`, e.g.
//! `BIBGET_SCOPUS__API_KEY`. A missing file is not an error.

mod file_config;

pub use file_config::{
    ConfigFileError, HttpConfig, LoggingConfig, ScopusConfig, Settings, SourcesConfig,
};

use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "BIBGET";

/// Default configuration file location
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bibget")
        .join("config.toml")
}

/// Load settings from a file plus environment overrides
pub fn load_config(path: &Path) -> Result<Settings, config::ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize()
}

/// Persisted configuration at a fixed path.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the configuration file has been written before
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Effective settings (file + environment)
    pub fn load(&self) -> Result<Settings, config::ConfigError> {
        load_config(&self.path)
    }

    /// The stored Scopus API key, if any
    pub fn get_api_key(&self) -> Option<String> {
        self.load()
            .ok()
            .and_then(|s| s.api_key().map(str::to_string))
    }

    /// Store the Scopus API key, keeping the other settings of the file.
    ///
    /// An empty key is stored as well, recording that the user declined.
    pub fn set_api_key(&self, key: &str) -> Result<(), ConfigFileError> {
        let mut settings = if self.exists() {
            Settings::load(&self.path)?
        } else {
            Settings::default()
        };
        settings.scopus.api_key = key.trim().to_string();
        settings.save(&self.path)
    }
}
