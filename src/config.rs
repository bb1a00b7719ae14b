//! Runtime Configuration
//!
//! Handles parsing and management of catboost.toml configuration files.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::ffi::LIBRARY_PATH_ENV;
use crate::model::PredictionType;

/// Name of the configuration file searched for by [`RuntimeConfig::find_and_load`]
pub const CONFIG_FILE_NAME: &str = "catboost.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching catboost.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// Where and how to load the native library
    #[serde(default)]
    pub library: LibraryConfig,

    /// Defaults applied to freshly loaded models
    #[serde(default)]
    pub model: ModelConfig,
}

impl RuntimeConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let mut config: RuntimeConfig = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration from the current directory or parents.
    pub fn load_from_cwd() -> ConfigResult<Self> {
        let cwd = std::env::current_dir().map_err(ConfigError::Io)?;
        Self::find_and_load(&cwd)
    }

    /// Find and load configuration by searching up from the given directory.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                // Reached root without finding config
                let mut config = Self::default();
                config.apply_env();
                return Ok(config);
            }
        }
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// `CATBOOST_LIBRARY_PATH` wins over the file's `library.path`.
    fn apply_env(&mut self) {
        self.override_library_path(std::env::var(LIBRARY_PATH_ENV).ok());
    }

    fn override_library_path(&mut self, value: Option<String>) {
        if let Some(path) = value.filter(|p| !p.is_empty()) {
            self.library.path = Some(PathBuf::from(path));
        }
    }
}

/// Native library location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Explicit path to libcatboostmodel
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Extra directories to search
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    /// Fail when any entry point is missing
    #[serde(default = "default_true")]
    pub strict: bool,
}

fn default_true() -> bool {
    true
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            path: None,
            search_paths: Vec::new(),
            strict: true,
        }
    }
}

/// Model defaults.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ModelConfig {
    /// Prediction type set right after loading
    #[serde(default)]
    pub prediction_type: PredictionType,

    /// GPU device to enable after loading
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu_device: Option<i32>,
}
