//! Per-test fixture descriptors.
//!
//! A fixture is a small typed marker a test attaches to its context
//! declaration. Fixture sets compose: a set can inherit from a shared parent
//! (base fixtures for a whole suite) while its own declarations take
//! precedence, mirroring how test configuration is usually layered.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Marker trait for test fixtures.
///
/// Fixtures are looked up by concrete type, so implementations stay plain
/// data. `as_any` enables the downcast.
pub trait TestFixture: Any + fmt::Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

/// Ordered, composable set of fixtures for one test context.
#[derive(Debug, Default, Clone)]
pub struct TestFixtures {
    local: Vec<Arc<dyn TestFixture>>,
    parent: Option<Arc<TestFixtures>>,
}

impl TestFixtures {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fixture. Later additions of the same type shadow earlier ones.
    pub fn with(mut self, fixture: impl TestFixture) -> Self {
        self.local.push(Arc::new(fixture));
        self
    }

    /// Inherit from a parent set. Local declarations win over the parent;
    /// a second call replaces the previous parent.
    pub fn inherit(mut self, parent: TestFixtures) -> Self {
        self.parent = Some(Arc::new(parent));
        self
    }

    /// Find the nearest declaration of fixture type `F`.
    ///
    /// Searches local fixtures newest-first, then walks the parent chain.
    pub fn find<F: TestFixture>(&self) -> Option<&F> {
        self.local
            .iter()
            .rev()
            .find_map(|fixture| fixture.as_any().downcast_ref::<F>())
            .or_else(|| self.parent.as_deref().and_then(|parent| parent.find::<F>()))
    }

    /// Total number of declarations, including inherited ones.
    pub fn len(&self) -> usize {
        self.local.len() + self.parent.as_deref().map_or(0, |parent| parent.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Per-test marker controlling the in-process transport.
///
/// When present, its value is authoritative: it overrides the ambient
/// `inprocess.auto_configure` property in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InProcessTransportFixture {
    pub enabled: bool,
}

impl InProcessTransportFixture {
    /// Marker requesting the in-process transport.
    pub fn enabled() -> Self {
        Self { enabled: true }
    }

    /// Marker pinning the transport to TCP even under ambient auto-configure.
    pub fn disabled() -> Self {
        Self { enabled: false }
    }
}

impl TestFixture for InProcessTransportFixture {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct SuiteLabel(&'static str);

    impl TestFixture for SuiteLabel {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_find_returns_nearest_declaration() {
        let fixtures = TestFixtures::new()
            .with(InProcessTransportFixture::disabled())
            .with(InProcessTransportFixture::enabled());
        let found = fixtures.find::<InProcessTransportFixture>().unwrap();
        assert!(found.enabled);
    }

    #[test]
    fn test_child_wins_over_parent() {
        let parent = TestFixtures::new().with(InProcessTransportFixture::enabled());
        let child = TestFixtures::new()
            .with(InProcessTransportFixture::disabled())
            .inherit(parent);
        let found = child.find::<InProcessTransportFixture>().unwrap();
        assert!(!found.enabled);
    }

    #[test]
    fn test_parent_fills_missing_types() {
        let parent = TestFixtures::new().with(SuiteLabel("base"));
        let child = TestFixtures::new()
            .with(InProcessTransportFixture::enabled())
            .inherit(parent);
        assert_eq!(child.find::<SuiteLabel>(), Some(&SuiteLabel("base")));
        assert!(child.find::<InProcessTransportFixture>().is_some());
        assert_eq!(child.len(), 2);
    }

    #[test]
    fn test_absent_type_is_none() {
        let fixtures = TestFixtures::new();
        assert!(fixtures.find::<InProcessTransportFixture>().is_none());
        assert!(fixtures.is_empty());
    }
}
