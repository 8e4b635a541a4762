//! Test context caching.
//!
//! Spawned servers are expensive relative to the tests that use them, so the
//! harness caches running contexts keyed by the full runner configuration.
//! Two runners share a context exactly when their keys are equal, which makes
//! customizer equality a correctness property rather than an optimization:
//! a too-loose key leaks the wrong transport into a test, a too-strict key
//! rebuilds identical servers over and over.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tonic::transport::Channel;
use tracing::{debug, warn};

use super::customizer::CustomizerKey;
use crate::capabilities::CapabilitySet;
use crate::config::GrpcConfig;
use crate::error::AssemblyResult;
use crate::server::GrpcServerHandle;
use crate::transport::TransportKind;

/// Cache key derived from everything that can change a built context.
///
/// The declarative runner state (properties, files, environment prefix,
/// masked capabilities, registry presence) is the configuration fingerprint;
/// the ordered customizer list carries per-test fixture identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey {
    pub(crate) properties: Vec<(String, String)>,
    pub(crate) config_files: Vec<PathBuf>,
    pub(crate) env_prefix: Option<String>,
    pub(crate) masked_capabilities: CapabilitySet,
    pub(crate) observation_registry: bool,
    pub(crate) customizers: Vec<CustomizerKey>,
}

impl ContextKey {
    /// Customizer identities in application order.
    pub fn customizers(&self) -> &[CustomizerKey] {
        &self.customizers
    }
}

/// A running server context held by the cache.
///
/// Captures the assembly's decision record (config and registered interceptor
/// names) alongside the server handle, since the server itself is consumed
/// when it is spawned.
#[derive(Debug)]
pub struct TestContext {
    config: GrpcConfig,
    interceptor_names: Vec<String>,
    handle: GrpcServerHandle,
}

impl TestContext {
    pub(crate) fn new(
        config: GrpcConfig,
        interceptor_names: Vec<String>,
        handle: GrpcServerHandle,
    ) -> Self {
        Self {
            config,
            interceptor_names,
            handle,
        }
    }

    /// Configuration the server was built with, including any properties
    /// injected by customizers.
    pub fn config(&self) -> &GrpcConfig {
        &self.config
    }

    /// Names of the global interceptors assembly registered.
    pub fn interceptor_names(&self) -> &[String] {
        &self.interceptor_names
    }

    pub fn has_interceptor(&self, name: &str) -> bool {
        self.interceptor_names.iter().any(|n| n == name)
    }

    pub fn transport(&self) -> TransportKind {
        self.handle.transport()
    }

    pub fn handle(&self) -> &GrpcServerHandle {
        &self.handle
    }

    /// Client channel to the in-process server.
    pub fn channel(&self) -> AssemblyResult<Channel> {
        self.handle.channel()
    }
}

/// Process-wide cache of running test contexts.
///
/// Safe to share across test threads: lookups and inserts run under a lock,
/// contexts are immutable once cached, and a racing build loses to the entry
/// that got there first (the loser's handle drop shuts its server down).
#[derive(Debug, Default)]
pub struct ContextCache {
    contexts: Mutex<HashMap<ContextKey, Arc<TestContext>>>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &ContextKey) -> Option<Arc<TestContext>> {
        self.contexts.lock().get(key).cloned()
    }

    /// Insert a freshly built context unless an equal key arrived first.
    ///
    /// Returns the cached context either way, so concurrent builders converge
    /// on one shared instance.
    pub(crate) fn insert(&self, key: ContextKey, context: TestContext) -> Arc<TestContext> {
        let mut contexts = self.contexts.lock();
        if contexts.contains_key(&key) {
            debug!("context cache already holds an equal key, discarding fresh build");
        }
        contexts
            .entry(key)
            .or_insert_with(|| Arc::new(context))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.contexts.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.lock().is_empty()
    }

    /// Stop every cached server and clear the cache.
    pub async fn shutdown(&self) {
        let contexts: Vec<Arc<TestContext>> = {
            let mut guard = self.contexts.lock();
            guard.drain().map(|(_, context)| context).collect()
        };
        for context in contexts {
            if let Err(e) = context.handle().stop().await {
                warn!(error = %e, "cached test context did not stop cleanly");
            }
        }
        debug!("context cache shut down");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};
    use std::sync::Arc;

    use super::super::customizer::InProcessTransportCustomizer;
    use super::super::fixture::InProcessTransportFixture;
    use super::*;

    fn key(fixture: Option<InProcessTransportFixture>) -> ContextKey {
        ContextKey {
            properties: vec![("server.bind_address".into(), "127.0.0.1:0".into())],
            config_files: Vec::new(),
            env_prefix: None,
            masked_capabilities: CapabilitySet::empty(),
            observation_registry: false,
            customizers: vec![CustomizerKey::new(Arc::new(
                InProcessTransportCustomizer::new(fixture),
            ))],
        }
    }

    fn hash_of(key: &ContextKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_equal_keys_hash_equal() {
        let a = key(Some(InProcessTransportFixture::enabled()));
        let b = key(Some(InProcessTransportFixture::enabled()));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_fixture_difference_changes_key() {
        let enabled = key(Some(InProcessTransportFixture::enabled()));
        let absent = key(None);
        assert_ne!(enabled, absent);
    }

    #[test]
    fn test_property_difference_changes_key() {
        let mut other = key(None);
        other.properties.push(("inprocess.enabled".into(), "true".into()));
        assert_ne!(key(None), other);
    }

    #[test]
    fn test_masked_capability_changes_key() {
        let mut masked = key(None);
        masked.masked_capabilities = CapabilitySet::OBSERVATION;
        assert_ne!(key(None), masked);
    }

    #[test]
    fn test_registry_presence_changes_key() {
        let mut with_registry = key(None);
        with_registry.observation_registry = true;
        assert_ne!(key(None), with_registry);
    }
}
