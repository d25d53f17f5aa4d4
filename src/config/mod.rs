//! Configuration management for Grist

pub mod schema;

pub use schema::Config;

use crate::error::{GristError, GristResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// On-disk state of one Grist installation
///
/// ```text
/// <root>/store/        recorded stage results
/// <root>/work/         per-request working directories
/// <root>/repository/   downloaded Maven artifacts
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateDirs {
    root: PathBuf,
}

impl StateDirs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn store(&self) -> PathBuf {
        self.root.join("store")
    }

    pub fn work(&self) -> PathBuf {
        self.root.join("work")
    }

    pub fn repository(&self) -> PathBuf {
        self.root.join("repository")
    }

    /// Ensure all state directories exist
    pub async fn ensure(&self) -> GristResult<()> {
        for dir in [self.root.clone(), self.store(), self.work(), self.repository()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| GristError::io(format!("creating directory {}", dir.display()), e))?;
        }
        Ok(())
    }
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("grist")
            .join("config.toml")
    }

    /// Get the default state directory path
    pub fn default_state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("grist")
    }

    /// State directories: explicit override, then config, then default
    pub fn state_dirs(config: &Config, explicit: Option<PathBuf>) -> StateDirs {
        let root = explicit
            .or_else(|| config.general.state_dir.clone())
            .unwrap_or_else(Self::default_state_dir);
        StateDirs::new(root)
    }

    /// Load configuration, falling back to defaults if the file is missing
    pub async fn load(&self) -> GristResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> GristResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| GristError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| GristError::ConfigInvalid {
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
