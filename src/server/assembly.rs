//! # Assembly
//!
//! Builder that wires configuration, capabilities, interceptors, and services
//! into a [`GrpcServer`]. The builder is a plain owned value: nothing here is
//! process-global, and all conditional wiring decisions run exactly once
//! inside [`GrpcAssembly::build`].

use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;

use http::{Request, Response};
use tonic::body::BoxBody;
use tonic::server::NamedService;
use tonic::service::RoutesBuilder;
use tower::Service;
use tracing::debug;

#[cfg(feature = "observation")]
use crate::interceptors::observation::register_observation_interceptor;
#[cfg(feature = "observation")]
use crate::metrics::ObservationRegistry;

use crate::capabilities::CapabilitySet;
use crate::config::{ConfigResult, GrpcConfig, PropertySources};
use crate::error::AssemblyResult;
use crate::interceptors::{CallInterceptor, InterceptorRegistry};

use super::GrpcServer;

/// Builder for an assembled gRPC server.
///
/// Capabilities are probed once at construction and can only shrink from
/// there (via [`without_capability`](Self::without_capability)), which keeps
/// conditional wiring deterministic for the lifetime of the assembly.
pub struct GrpcAssembly {
    sources: PropertySources,
    capabilities: CapabilitySet,
    interceptors: InterceptorRegistry,
    routes: RoutesBuilder,
    descriptor_sets: Vec<&'static [u8]>,
    #[cfg(feature = "observation")]
    observation_registry: Option<ObservationRegistry>,
}

impl GrpcAssembly {
    pub fn new() -> Self {
        Self {
            sources: PropertySources::new(),
            capabilities: CapabilitySet::probe(),
            interceptors: InterceptorRegistry::new(),
            routes: RoutesBuilder::default(),
            descriptor_sets: Vec::new(),
            #[cfg(feature = "observation")]
            observation_registry: None,
        }
    }

    /// Set a property override, the highest-precedence configuration layer.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.sources.set(key, value);
        self
    }

    /// Add a configuration file layer.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.sources = self.sources.with_file(path);
        self
    }

    /// Replace the environment variable prefix used for the env layer.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sources = self.sources.with_env_prefix(prefix);
        self
    }

    /// Supply the observation registry the observation registrar needs.
    #[cfg(feature = "observation")]
    pub fn with_observation_registry(mut self, registry: ObservationRegistry) -> Self {
        self.observation_registry = Some(registry);
        self
    }

    /// Mask a probed capability for this assembly.
    ///
    /// Used by the test harness to exercise wiring that reacts to a
    /// capability being absent from the build.
    pub fn without_capability(mut self, capability: CapabilitySet) -> Self {
        self.capabilities.remove(capability);
        self
    }

    pub fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    /// Add a gRPC service to the routed set.
    pub fn add_service<S>(mut self, service: S) -> Self
    where
        S: Service<Request<BoxBody>, Response = Response<BoxBody>, Error = Infallible>
            + NamedService
            + Clone
            + Send
            + 'static,
        S::Future: Send + 'static,
    {
        debug!(service = S::NAME, "added gRPC service");
        self.routes.add_service(service);
        self
    }

    /// Register an encoded file descriptor set for the reflection service.
    pub fn add_file_descriptor_set(mut self, descriptor_set: &'static [u8]) -> Self {
        self.descriptor_sets.push(descriptor_set);
        self
    }

    /// Register a global interceptor explicitly.
    ///
    /// Explicit registrations run before conditional registrars, so an
    /// explicit interceptor under a registrar's name makes that registrar
    /// back off.
    pub fn register_global_interceptor(mut self, interceptor: Arc<dyn CallInterceptor>) -> Self {
        self.interceptors.register_global(interceptor);
        self
    }

    /// Resolve the current configuration layers without building.
    ///
    /// Context customizers use this to read the ambient environment before
    /// deciding whether to stack another override on top.
    pub fn config_snapshot(&self) -> ConfigResult<GrpcConfig> {
        self.sources.load()
    }

    /// Load configuration, run conditional registrars, and produce the
    /// assembled server.
    pub fn build(self) -> AssemblyResult<GrpcServer> {
        let config = self.sources.load()?;
        let mut interceptors = self.interceptors;

        #[cfg(feature = "observation")]
        register_observation_interceptor(
            &mut interceptors,
            self.observation_registry.as_ref(),
            self.capabilities,
            &config.server.observation,
        );

        let transport = if config.inprocess.enabled {
            "in-process"
        } else {
            "tcp"
        };
        debug!(
            capabilities = %self.capabilities,
            interceptors = interceptors.len(),
            transport,
            "assembled gRPC server"
        );

        Ok(GrpcServer::new(
            config,
            interceptors,
            self.routes.routes(),
            self.descriptor_sets,
        ))
    }
}

impl Default for GrpcAssembly {
    fn default() -> Self {
        Self::new()
    }
}
