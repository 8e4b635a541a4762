//! Error types for configuration loading and validation.

use thiserror::Error;

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Errors raised while loading or resolving layered configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The underlying configuration backend rejected a source or a value.
    #[error("failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    /// A configuration file was named explicitly but does not exist.
    #[error("configuration file not found: {path}")]
    FileNotFound { path: String },

    /// A property carried a value that cannot be used for its key.
    #[error("invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}

impl ConfigError {
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn invalid_value(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            key: key.into(),
            reason: reason.into(),
        }
    }
}
