//! # Configuration
//!
//! Typed configuration tree for gRPC server assembly, resolved from layered
//! property sources (struct defaults, optional files, environment variables,
//! explicit overrides).
//!
//! The tree deliberately stays small: transport and HTTP/2 settings for the
//! server, a tri-state observation flag, and the in-process transport toggles
//! used by the test harness.

mod error;
mod sources;

pub use error::{ConfigError, ConfigResult};
pub use sources::PropertySources;

use serde::{Deserialize, Serialize};

/// Root configuration for an assembled gRPC server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrpcConfig {
    /// Server socket and HTTP/2 settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// In-process transport toggles (primarily driven by the test harness).
    #[serde(default)]
    pub inprocess: InProcessConfig,
}

impl Default for GrpcConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            inprocess: InProcessConfig::default(),
        }
    }
}

/// Server-side transport and protocol settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// TCP bind address, ignored when the in-process transport is enabled.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Register the standard gRPC health service (`grpc.health.v1.Health`).
    #[serde(default = "default_enable_health_service")]
    pub enable_health_service: bool,

    /// Register the server reflection service over all known descriptor sets.
    #[serde(default)]
    pub enable_reflection: bool,

    /// HTTP/2 keepalive ping interval in seconds.
    #[serde(default = "default_keepalive_interval")]
    pub http2_keepalive_interval_seconds: u64,

    /// HTTP/2 keepalive ping timeout in seconds.
    #[serde(default = "default_keepalive_timeout")]
    pub http2_keepalive_timeout_seconds: u64,

    /// Maximum number of concurrent HTTP/2 streams per connection.
    #[serde(default = "default_max_concurrent_streams")]
    pub max_concurrent_streams: u32,

    /// Maximum HTTP/2 frame size in bytes. `None` keeps the transport default.
    #[serde(default)]
    pub max_frame_size: Option<u32>,

    /// Observation interceptor settings.
    #[serde(default)]
    pub observation: ObservationConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            enable_health_service: default_enable_health_service(),
            enable_reflection: false,
            http2_keepalive_interval_seconds: default_keepalive_interval(),
            http2_keepalive_timeout_seconds: default_keepalive_timeout(),
            max_concurrent_streams: default_max_concurrent_streams(),
            max_frame_size: None,
            observation: ObservationConfig::default(),
        }
    }
}

/// Tri-state flag for the per-call observation interceptor.
///
/// `enabled` distinguishes "explicitly set" from "unset": an explicit value is
/// authoritative, while `None` defers to whether an observation registry was
/// supplied at assembly time. The default is resolved when the registrar runs,
/// never during deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObservationConfig {
    /// `server.observation.enabled`. `None` means unset.
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl ObservationConfig {
    /// Resolve the flag against the presence of an observation registry.
    ///
    /// An explicit value always wins. When unset, the flag mirrors
    /// `registry_present` so observation turns on exactly when there is a
    /// registry to record into.
    pub fn resolve(&self, registry_present: bool) -> bool {
        self.enabled.unwrap_or(registry_present)
    }
}

/// In-process transport toggles.
///
/// Keys are snake_case in every layer, like the rest of the tree: the file
/// key is `auto_configure` and the environment variable is
/// `GANTRY__INPROCESS__AUTO_CONFIGURE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct InProcessConfig {
    /// `inprocess.enabled`. When true the server serves on an in-memory
    /// transport instead of binding a TCP socket.
    #[serde(default)]
    pub enabled: bool,

    /// `inprocess.auto_configure`. Ambient opt-in read by the test harness
    /// when no per-test fixture says otherwise.
    #[serde(default)]
    pub auto_configure: bool,
}

fn default_bind_address() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_enable_health_service() -> bool {
    true
}

fn default_keepalive_interval() -> u64 {
    30
}

fn default_keepalive_timeout() -> u64 {
    10
}

fn default_max_concurrent_streams() -> u32 {
    256
}
