//! Context customizers.
//!
//! A customizer is a hook that mutates an assembly before it is built. The
//! test harness collects customizers from factories, applies them in order,
//! and uses their equality to key the context cache, so customizers must
//! compare equal exactly when they would customize identically.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use tracing::debug;

use super::fixture::{InProcessTransportFixture, TestFixtures};
use crate::config::ConfigResult;
use crate::server::GrpcAssembly;

/// Property the in-process customizer injects when it decides to toggle.
pub const INPROCESS_ENABLED_PROPERTY: &str = "inprocess.enabled";

/// Ambient property consulted when no fixture declares a preference.
pub const INPROCESS_AUTO_CONFIGURE_PROPERTY: &str = "inprocess.auto_configure";

/// Hook that customizes an assembly before the test harness builds it.
///
/// Identity matters as much as behavior: the context cache treats two
/// customizers as interchangeable iff `dyn_eq` says so. Getting equality
/// wrong either leaks an incompatible cached context into a test or rebuilds
/// identical contexts on every run.
pub trait ContextCustomizer: fmt::Debug + Send + Sync {
    /// Apply this customizer. Errors only surface genuinely broken input,
    /// such as a malformed ambient property value.
    fn customize(&self, assembly: GrpcAssembly) -> ConfigResult<GrpcAssembly>;

    fn as_any(&self) -> &dyn Any;

    /// Equality across trait objects. Implementations downcast `other` and
    /// compare; a different concrete type is never equal.
    fn dyn_eq(&self, other: &dyn ContextCustomizer) -> bool;

    /// Hash consistent with [`dyn_eq`](Self::dyn_eq).
    fn dyn_hash(&self, state: &mut dyn Hasher);
}

/// Hashable, comparable handle to a customizer, usable as part of a cache key.
#[derive(Debug, Clone)]
pub struct CustomizerKey(Arc<dyn ContextCustomizer>);

impl CustomizerKey {
    pub fn new(customizer: Arc<dyn ContextCustomizer>) -> Self {
        Self(customizer)
    }

    pub fn customizer(&self) -> &dyn ContextCustomizer {
        self.0.as_ref()
    }
}

impl PartialEq for CustomizerKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

impl Eq for CustomizerKey {}

impl Hash for CustomizerKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.dyn_hash(state);
    }
}

/// Produces customizers from the fixtures a test declared.
///
/// Factories run once per context key computation. Returning `None` means
/// this factory contributes nothing for these fixtures.
pub trait ContextCustomizerFactory: fmt::Debug + Send + Sync {
    fn create(&self, fixtures: &TestFixtures) -> Option<Arc<dyn ContextCustomizer>>;
}

/// Factory for [`InProcessTransportCustomizer`].
///
/// Always produces a customizer, even when no fixture is declared: the
/// absence of a fixture is part of the customizer's identity, so contexts
/// with and without the fixture never share a cache entry by accident.
#[derive(Debug, Default, Clone, Copy)]
pub struct InProcessTransportCustomizerFactory;

impl ContextCustomizerFactory for InProcessTransportCustomizerFactory {
    fn create(&self, fixtures: &TestFixtures) -> Option<Arc<dyn ContextCustomizer>> {
        let fixture = fixtures.find::<InProcessTransportFixture>().copied();
        Some(Arc::new(InProcessTransportCustomizer::new(fixture)))
    }
}

/// Decides whether a test context runs on the in-process transport.
///
/// Resolution is a single pass with no retries:
/// 1. a declared fixture is authoritative in both directions;
/// 2. otherwise the ambient `inprocess.auto_configure` property from the
///    assembly's current layers applies, defaulting to false.
///
/// A true decision injects `inprocess.enabled=true` as a highest-precedence
/// override; a false decision leaves the assembly untouched. Applying the
/// customizer twice is idempotent because the override is set-valued.
///
/// Equality and hashing derive solely from the resolved fixture, including
/// its absence. The ambient property is read at customize time and does not
/// participate in identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InProcessTransportCustomizer {
    fixture: Option<InProcessTransportFixture>,
}

impl InProcessTransportCustomizer {
    pub fn new(fixture: Option<InProcessTransportFixture>) -> Self {
        Self { fixture }
    }

    /// The fixture this customizer resolved, if any.
    pub fn fixture(&self) -> Option<InProcessTransportFixture> {
        self.fixture
    }
}

impl ContextCustomizer for InProcessTransportCustomizer {
    fn customize(&self, assembly: GrpcAssembly) -> ConfigResult<GrpcAssembly> {
        let enable = match self.fixture {
            Some(fixture) => {
                debug!(
                    enabled = fixture.enabled,
                    "in-process transport resolved from fixture"
                );
                fixture.enabled
            }
            None => {
                let auto_configure = assembly.config_snapshot()?.inprocess.auto_configure;
                debug!(
                    auto_configure,
                    "in-process transport resolved from ambient property"
                );
                auto_configure
            }
        };

        if enable {
            Ok(assembly.with_property(INPROCESS_ENABLED_PROPERTY, "true"))
        } else {
            Ok(assembly)
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn dyn_eq(&self, other: &dyn ContextCustomizer) -> bool {
        other
            .as_any()
            .downcast_ref::<Self>()
            .is_some_and(|other| self == other)
    }

    fn dyn_hash(&self, mut state: &mut dyn Hasher) {
        TypeId::of::<Self>().hash(&mut state);
        self.fixture.hash(&mut state);
    }
}

#[cfg(test)]
mod tests {
    use std::collections::hash_map::DefaultHasher;

    use super::*;

    fn hash_of(key: &CustomizerKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn key_for(fixture: Option<InProcessTransportFixture>) -> CustomizerKey {
        CustomizerKey::new(Arc::new(InProcessTransportCustomizer::new(fixture)))
    }

    #[test]
    fn test_fixture_enabled_injects_property() {
        let customizer =
            InProcessTransportCustomizer::new(Some(InProcessTransportFixture::enabled()));
        let assembly = customizer.customize(GrpcAssembly::new()).unwrap();
        let config = assembly.config_snapshot().unwrap();
        assert!(config.inprocess.enabled);
    }

    #[test]
    fn test_fixture_overrides_ambient_auto_configure() {
        let customizer =
            InProcessTransportCustomizer::new(Some(InProcessTransportFixture::disabled()));
        let assembly = GrpcAssembly::new().with_property(INPROCESS_AUTO_CONFIGURE_PROPERTY, "true");
        let assembly = customizer.customize(assembly).unwrap();
        let config = assembly.config_snapshot().unwrap();
        assert!(!config.inprocess.enabled);
    }

    #[test]
    fn test_no_fixture_follows_ambient_auto_configure() {
        let customizer = InProcessTransportCustomizer::new(None);

        let plain = customizer.customize(GrpcAssembly::new()).unwrap();
        assert!(!plain.config_snapshot().unwrap().inprocess.enabled);

        let ambient = GrpcAssembly::new().with_property(INPROCESS_AUTO_CONFIGURE_PROPERTY, "true");
        let toggled = customizer.customize(ambient).unwrap();
        assert!(toggled.config_snapshot().unwrap().inprocess.enabled);
    }

    #[test]
    fn test_malformed_ambient_value_is_an_error() {
        let customizer = InProcessTransportCustomizer::new(None);
        let assembly =
            GrpcAssembly::new().with_property(INPROCESS_AUTO_CONFIGURE_PROPERTY, "maybe");
        assert!(customizer.customize(assembly).is_err());
    }

    #[test]
    fn test_customize_twice_is_idempotent() {
        let customizer =
            InProcessTransportCustomizer::new(Some(InProcessTransportFixture::enabled()));
        let once = customizer.customize(GrpcAssembly::new()).unwrap();
        let config_once = once.config_snapshot().unwrap();
        let twice = customizer.customize(once).unwrap();
        assert_eq!(twice.config_snapshot().unwrap(), config_once);
    }

    #[test]
    fn test_equal_fixtures_compare_and_hash_equal() {
        let a = key_for(Some(InProcessTransportFixture::enabled()));
        let b = key_for(Some(InProcessTransportFixture::enabled()));
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));

        let absent_a = key_for(None);
        let absent_b = key_for(None);
        assert_eq!(absent_a, absent_b);
        assert_eq!(hash_of(&absent_a), hash_of(&absent_b));
    }

    #[test]
    fn test_differing_fixtures_are_unequal() {
        let enabled = key_for(Some(InProcessTransportFixture::enabled()));
        let disabled = key_for(Some(InProcessTransportFixture::disabled()));
        let absent = key_for(None);
        assert_ne!(enabled, disabled);
        assert_ne!(enabled, absent);
        assert_ne!(disabled, absent);
    }

    #[test]
    fn test_different_concrete_types_are_unequal() {
        #[derive(Debug, PartialEq, Eq, Hash)]
        struct Other;

        impl ContextCustomizer for Other {
            fn customize(&self, assembly: GrpcAssembly) -> ConfigResult<GrpcAssembly> {
                Ok(assembly)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn dyn_eq(&self, other: &dyn ContextCustomizer) -> bool {
                other.as_any().downcast_ref::<Self>().is_some()
            }

            fn dyn_hash(&self, mut state: &mut dyn Hasher) {
                TypeId::of::<Self>().hash(&mut state);
            }
        }

        let in_process = key_for(None);
        let other = CustomizerKey::new(Arc::new(Other));
        assert_ne!(in_process, other);
    }

    #[test]
    fn test_factory_resolves_nearest_fixture() {
        let fixtures = TestFixtures::new()
            .with(InProcessTransportFixture::disabled())
            .with(InProcessTransportFixture::enabled());
        let customizer = InProcessTransportCustomizerFactory.create(&fixtures).unwrap();
        let resolved = customizer
            .as_any()
            .downcast_ref::<InProcessTransportCustomizer>()
            .unwrap();
        assert_eq!(
            resolved.fixture(),
            Some(InProcessTransportFixture::enabled())
        );
    }

    #[test]
    fn test_factory_without_fixture_still_produces_customizer() {
        let customizer = InProcessTransportCustomizerFactory
            .create(&TestFixtures::new())
            .unwrap();
        let resolved = customizer
            .as_any()
            .downcast_ref::<InProcessTransportCustomizer>()
            .unwrap();
        assert_eq!(resolved.fixture(), None);
    }
}
