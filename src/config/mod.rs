//! Configuration management for makebuildserver
//!
//! The configuration is loaded once per run and passed by reference to
//! every component; there is no process-wide configuration state.

pub mod schema;

pub use schema::{
    Config, SyncFailurePolicy, DEFAULT_BASEBOX, DEFAULT_BASEBOX_VERSION, SUPPORTED_PROVIDERS,
};

use crate::error::{BuildServerError, BuildServerResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with the default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// The default config file path, relative to the invocation directory
    pub fn default_config_path() -> PathBuf {
        PathBuf::from("makebuildserver.toml")
    }

    /// Load and validate the configuration, using defaults if no file exists
    pub async fn load(&self) -> BuildServerResult<Config> {
        let config = if self.config_path.exists() {
            self.load_from_file(&self.config_path).await?
        } else {
            debug!("Config file not found, using defaults");
            Config::default()
        };
        validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> BuildServerResult<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            BuildServerError::io(format!("reading config from {}", path.display()), e)
        })?;

        toml::from_str(&content).map_err(|e| BuildServerError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Validate cross-field constraints that the serde schema cannot express
pub fn validate(config: &Config) -> BuildServerResult<()> {
    if !SUPPORTED_PROVIDERS.contains(&config.vm.provider.as_str()) {
        return Err(BuildServerError::UnsupportedProvider(
            config.vm.provider.clone(),
        ));
    }

    // Pinning a version only makes sense for the default box; digest sets
    // are keyed by the pinned default's versions.
    if !config.basebox.is_default() && config.basebox.version.is_some() {
        return Err(BuildServerError::BaseboxVersionConflict(
            config.basebox.name.clone(),
        ));
    }

    Ok(())
}
