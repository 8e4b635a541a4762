//! Declarative assembly runner.
//!
//! The runner is the harness entry point for tests: declare properties,
//! fixtures, and capability masks up front, then either build a fresh server
//! per run or serve a cached context shared with equally configured runners.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use super::cache::{ContextCache, ContextKey, TestContext};
use super::customizer::{ContextCustomizerFactory, CustomizerKey, InProcessTransportCustomizerFactory};
use super::fixture::{TestFixture, TestFixtures};
use crate::capabilities::CapabilitySet;
use crate::error::AssemblyResult;
#[cfg(feature = "observation")]
use crate::metrics::ObservationRegistry;
use crate::server::{GrpcAssembly, GrpcServer};

/// Reusable, declarative test harness for server assemblies.
///
/// A runner never mutates itself while running: every [`run`](Self::run)
/// assembles a fresh context from the declared state, and
/// [`context_key`](Self::context_key) is stable for as long as the
/// declarations are. The in-process transport customizer factory is always
/// installed, so fixture-driven transport toggling works out of the box.
#[derive(Debug)]
pub struct AssemblyRunner {
    properties: Vec<(String, String)>,
    config_files: Vec<PathBuf>,
    env_prefix: Option<String>,
    masked_capabilities: CapabilitySet,
    fixtures: TestFixtures,
    factories: Vec<Arc<dyn ContextCustomizerFactory>>,
    #[cfg(feature = "observation")]
    observation_registry: Option<ObservationRegistry>,
}

impl AssemblyRunner {
    pub fn new() -> Self {
        Self {
            properties: Vec::new(),
            config_files: Vec::new(),
            env_prefix: None,
            masked_capabilities: CapabilitySet::empty(),
            fixtures: TestFixtures::new(),
            factories: vec![Arc::new(InProcessTransportCustomizerFactory)],
            #[cfg(feature = "observation")]
            observation_registry: None,
        }
    }

    /// Declare a property override.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.push((key.into(), value.into()));
        self
    }

    /// Declare a configuration file layer.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_files.push(path.into());
        self
    }

    /// Replace the environment variable prefix for assembled contexts.
    ///
    /// Tests that exercise the env layer point this at a unique prefix so
    /// parallel tests cannot observe each other's variables.
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    /// Declare a per-test fixture.
    pub fn with_fixture(mut self, fixture: impl TestFixture) -> Self {
        self.fixtures = self.fixtures.with(fixture);
        self
    }

    /// Inherit a shared fixture set. Fixtures declared on this runner win.
    pub fn inherit_fixtures(mut self, parent: TestFixtures) -> Self {
        self.fixtures = self.fixtures.inherit(parent);
        self
    }

    /// Supply an observation registry to assembled contexts.
    #[cfg(feature = "observation")]
    pub fn with_observation_registry(mut self, registry: ObservationRegistry) -> Self {
        self.observation_registry = Some(registry);
        self
    }

    /// Mask a capability in assembled contexts, as if the corresponding
    /// feature were absent from the build.
    pub fn without_capability(mut self, capability: CapabilitySet) -> Self {
        self.masked_capabilities |= capability;
        self
    }

    /// Install an additional customizer factory.
    pub fn with_customizer_factory(mut self, factory: Arc<dyn ContextCustomizerFactory>) -> Self {
        self.factories.push(factory);
        self
    }

    /// Customizers resolved from the declared fixtures, in factory order.
    fn customizers(&self) -> Vec<CustomizerKey> {
        self.factories
            .iter()
            .filter_map(|factory| factory.create(&self.fixtures))
            .map(CustomizerKey::new)
            .collect()
    }

    /// Cache key for contexts built from the current declarations.
    pub fn context_key(&self) -> ContextKey {
        #[cfg(feature = "observation")]
        let observation_registry = self.observation_registry.is_some();
        #[cfg(not(feature = "observation"))]
        let observation_registry = false;

        ContextKey {
            properties: self.properties.clone(),
            config_files: self.config_files.clone(),
            env_prefix: self.env_prefix.clone(),
            masked_capabilities: self.masked_capabilities,
            observation_registry,
            customizers: self.customizers(),
        }
    }

    /// Fresh assembly from the declared state, before customization.
    fn assemble(&self) -> GrpcAssembly {
        let mut assembly = GrpcAssembly::new();
        if let Some(prefix) = &self.env_prefix {
            assembly = assembly.with_env_prefix(prefix.clone());
        }
        for path in &self.config_files {
            assembly = assembly.with_config_file(path.clone());
        }
        for (key, value) in &self.properties {
            assembly = assembly.with_property(key.clone(), value.clone());
        }
        #[cfg(feature = "observation")]
        if let Some(registry) = &self.observation_registry {
            assembly = assembly.with_observation_registry(registry.clone());
        }
        assembly.without_capability(self.masked_capabilities)
    }

    /// Assemble, customize, and build a server without starting it.
    pub fn build(&self) -> AssemblyResult<GrpcServer> {
        let mut assembly = self.assemble();
        for key in self.customizers() {
            assembly = key.customizer().customize(assembly)?;
        }
        assembly.build()
    }

    /// Build a fresh context and hand it to the closure for assertions.
    pub fn run<F, T>(&self, f: F) -> AssemblyResult<T>
    where
        F: FnOnce(&GrpcServer) -> T,
    {
        let server = self.build()?;
        Ok(f(&server))
    }

    /// Build and start an uncached context.
    pub async fn serve(&self) -> AssemblyResult<TestContext> {
        let server = self.build()?;
        let config = server.config().clone();
        let interceptor_names = server
            .interceptors()
            .global()
            .iter()
            .map(|interceptor| interceptor.name().to_string())
            .collect();
        let handle = server.spawn().await?;
        Ok(TestContext::new(config, interceptor_names, handle))
    }

    /// Serve through the cache: reuse a running context with an equal key or
    /// build, start, and cache a new one.
    pub async fn serve_cached(&self, cache: &ContextCache) -> AssemblyResult<Arc<TestContext>> {
        let key = self.context_key();
        if let Some(context) = cache.get(&key) {
            debug!("reusing cached test context");
            return Ok(context);
        }
        let context = self.serve().await?;
        Ok(cache.insert(key, context))
    }
}

impl Default for AssemblyRunner {
    fn default() -> Self {
        Self::new()
    }
}
