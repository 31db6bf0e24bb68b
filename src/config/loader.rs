//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles directory discovery,
//! environment detection and source layering via the `config` crate.

use super::error::{ConfigResult, ConfigurationError};
use super::RenderFleetConfig;
use config::{Config, Environment, File, FileFormat};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Prefix for environment variable overrides (`RENDERFLEET__DISPATCH__MAX_RETRIES=5`)
pub const ENV_PREFIX: &str = "RENDERFLEET";

/// Loaded configuration plus where it came from
#[derive(Debug)]
pub struct ConfigManager {
    config: RenderFleetConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for tests that must not touch global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let config = Self::build(&config_directory, environment)?;
        config.validate()?;

        info!(
            environment = %environment,
            max_concurrency = config.dispatch.max_concurrency,
            max_retries = config.dispatch.max_retries,
            default_region = %config.storage.default_region,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Wrap an already-built configuration (tests, embedding)
    pub fn from_config(config: RenderFleetConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &RenderFleetConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn build(config_directory: &Path, environment: &str) -> ConfigResult<RenderFleetConfig> {
        let base = config_directory.join("base.toml");
        let overlay = config_directory.join(format!("{environment}.toml"));

        let settings = Config::builder()
            .add_source(File::from(base).format(FileFormat::Toml).required(false))
            .add_source(File::from(overlay).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize::<RenderFleetConfig>()?)
    }

    /// Detect the running environment from the usual variables
    pub fn detect_environment() -> String {
        env::var("RENDERFLEET_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        if let Ok(dir) = env::var("RENDERFLEET_CONFIG_DIR") {
            return PathBuf::from(dir);
        }
        PathBuf::from("config").join("renderfleet")
    }
}

impl TryFrom<&Path> for ConfigManager {
    type Error = ConfigurationError;

    fn try_from(directory: &Path) -> Result<Self, Self::Error> {
        if !directory.is_dir() {
            return Err(ConfigurationError::DirectoryNotFound {
                path: directory.to_path_buf(),
            });
        }
        let environment = Self::detect_environment();
        let config = Self::build(directory, &environment)?;
        config.validate()?;
        Ok(ConfigManager {
            config,
            environment,
            config_directory: directory.to_path_buf(),
        })
    }
}
