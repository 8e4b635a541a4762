//! Assembly and server lifecycle errors.

use thiserror::Error;

use crate::config::ConfigError;

/// Result alias for assembly and server operations.
pub type AssemblyResult<T> = Result<T, AssemblyError>;

/// Errors raised while building or running an assembled server.
///
/// Conditional wiring decisions are never errors: a registrar that skips
/// registration does so silently. Errors here mean genuinely broken input or
/// a failed transport.
#[derive(Debug, Error)]
pub enum AssemblyError {
    /// Configuration could not be resolved.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The configured TCP bind address did not parse.
    #[error("invalid bind address '{address}': {reason}")]
    InvalidBindAddress { address: String, reason: String },

    /// The underlying tonic transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    /// Reflection service construction failed.
    #[error("reflection setup failed: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),

    /// The in-process transport only works through `spawn()`, which returns
    /// the handle that exposes the client channel.
    #[error("in-process transport requires spawn(); serve() would leave the channel unreachable")]
    InProcessRequiresSpawn,

    /// A client channel was requested from a handle without an in-process
    /// transport.
    #[error("no in-process channel: server was assembled for TCP transport")]
    NoInProcessChannel,

    /// The server task terminated before or during a requested operation.
    #[error("server is not running")]
    ServerStopped,
}

impl AssemblyError {
    pub fn invalid_bind_address(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidBindAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_bind_address_message() {
        let error = AssemblyError::invalid_bind_address("not-an-addr", "invalid socket address");
        let message = error.to_string();
        assert!(message.contains("not-an-addr"));
        assert!(message.contains("invalid socket address"));
    }

    #[test]
    fn test_config_error_is_transparent() {
        let inner = ConfigError::invalid_value("inprocess.enabled", "expected a boolean");
        let error = AssemblyError::from(inner);
        assert!(error.to_string().contains("inprocess.enabled"));
    }
}
