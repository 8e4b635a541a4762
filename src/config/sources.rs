//! Layered property resolution.
//!
//! Sources are applied lowest to highest precedence: struct defaults, then
//! configuration files in the order added, then prefixed environment
//! variables, then explicit overrides in insertion order. Test-context
//! customizers rely on overrides being the top layer when they inject
//! `inprocess.enabled=true`.

use std::path::PathBuf;

use config::{Config, Environment, File};
use tracing::debug;

use super::error::{ConfigError, ConfigResult};
use super::GrpcConfig;

const DEFAULT_ENV_PREFIX: &str = "GANTRY";
const ENV_SEPARATOR: &str = "__";

/// Ordered collection of configuration layers for one assembly.
///
/// Resolution is non-consuming: `load()` can be called repeatedly as layers
/// accumulate, which is how customizers inspect the ambient environment
/// before deciding whether to add their own override on top.
#[derive(Debug, Clone)]
pub struct PropertySources {
    files: Vec<PathBuf>,
    env_prefix: String,
    overrides: Vec<(String, String)>,
}

impl PropertySources {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            env_prefix: DEFAULT_ENV_PREFIX.to_string(),
            overrides: Vec::new(),
        }
    }

    /// Add a configuration file layer. The file must exist when `load()` runs.
    pub fn with_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.files.push(path.into());
        self
    }

    /// Replace the environment variable prefix (default `GANTRY`).
    ///
    /// Variables are matched as `<PREFIX>__SECTION__KEY`, for example
    /// `GANTRY__INPROCESS__AUTO_CONFIGURE=true`.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Set an explicit override, the highest-precedence layer.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.overrides.push((key.into(), value.into()));
    }

    /// Overrides applied so far, in insertion order.
    pub fn overrides(&self) -> &[(String, String)] {
        &self.overrides
    }

    /// Resolve all layers into a typed configuration tree.
    pub fn load(&self) -> ConfigResult<GrpcConfig> {
        let defaults = Config::try_from(&GrpcConfig::default())?;
        let mut builder = Config::builder().add_source(defaults);

        for path in &self.files {
            if !path.exists() {
                return Err(ConfigError::file_not_found(path.display().to_string()));
            }
            builder = builder.add_source(File::from(path.as_path()).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(&self.env_prefix)
                .prefix_separator(ENV_SEPARATOR)
                .separator(ENV_SEPARATOR),
        );

        for (key, value) in &self.overrides {
            builder = builder.set_override(key.clone(), value.clone())?;
        }

        let config = builder.build()?.try_deserialize::<GrpcConfig>()?;
        debug!(
            files = self.files.len(),
            overrides = self.overrides.len(),
            "resolved configuration layers"
        );
        Ok(config)
    }
}

impl Default for PropertySources {
    fn default() -> Self {
        Self::new()
    }
}
