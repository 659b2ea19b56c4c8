//! Configuration Loader
//!
//! Layers built-in defaults, an optional config file and `TABULA__*`
//! environment overrides, then validates the merged result.

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::error::{ConfigResult, ConfigurationError};
use super::TabulaConfig;
use crate::constants::env as env_keys;

/// Default file stem searched in the working directory (any supported extension)
const DEFAULT_CONFIG_STEM: &str = "tabula";

#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    skip_environment: bool,
}

impl ConfigLoader {
    /// Loader honoring `$TABULA_CONFIG` when set
    pub fn new() -> Self {
        Self {
            config_path: env::var(env_keys::CONFIG_PATH).ok().map(PathBuf::from),
            skip_environment: false,
        }
    }

    /// Loader reading an explicit file, which must exist
    pub fn with_file(path: impl AsRef<Path>) -> Self {
        Self {
            config_path: Some(path.as_ref().to_path_buf()),
            skip_environment: false,
        }
    }

    /// Ignore process environment overrides; useful for tests
    pub fn without_environment(mut self) -> Self {
        self.skip_environment = true;
        self
    }

    pub fn load(&self) -> ConfigResult<TabulaConfig> {
        let mut builder = config::Config::builder();

        builder = match &self.config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigurationError::file_read_error(
                        path.display().to_string(),
                        "file not found",
                    ));
                }
                debug!(path = %path.display(), "Loading configuration file");
                builder.add_source(config::File::from(path.as_path()).required(true))
            }
            None => builder.add_source(config::File::with_name(DEFAULT_CONFIG_STEM).required(false)),
        };

        if !self.skip_environment {
            builder = builder.add_source(
                config::Environment::with_prefix(env_keys::CONFIG_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let merged = builder.build().map_err(|e| match &self.config_path {
            Some(path) => ConfigurationError::file_read_error(path.display().to_string(), e),
            None => ConfigurationError::parse_error(e),
        })?;

        let mut config: TabulaConfig = merged
            .try_deserialize()
            .map_err(ConfigurationError::parse_error)?;

        if !self.skip_environment {
            apply_credential_fallback(&mut config, env::var(env_keys::OPENAI_API_KEY).ok());
        }

        config.validate()?;

        debug!(config = %config.sanitized(), "Configuration merged");
        info!(
            model_id = %config.compute.model_id,
            concurrency = config.compute.concurrency,
            endpoint = %config.completion.endpoint,
            has_credential = config.completion.has_credential(),
            "⚙️ Configuration loaded"
        );

        Ok(config)
    }
}

/// Fill the credential from the provider's conventional variable when unset
fn apply_credential_fallback(config: &mut TabulaConfig, fallback: Option<String>) {
    if config.completion.has_credential() {
        return;
    }
    if let Some(key) = fallback.filter(|key| !key.trim().is_empty()) {
        config.completion.api_key = Some(key);
    }
}
