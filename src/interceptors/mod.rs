//! # Interceptors
//!
//! Server-wide call interceptors and the registry that holds them. Interceptors
//! registered in the global category are applied to every service on the
//! assembled server; registration happens during assembly, either explicitly
//! or through conditional registrars such as the observation registrar.

#[cfg(feature = "observation")]
pub mod observation;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

/// Details of a single inbound call, parsed from the request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallDetails {
    /// Full request path, e.g. `/grpc.health.v1.Health/Check`.
    pub path: String,
    /// Fully qualified service name.
    pub service: String,
    /// Method name within the service.
    pub method: String,
}

impl CallDetails {
    /// Parse call details from a gRPC request path.
    ///
    /// Paths that do not match `/Service/Method` keep the whole path as the
    /// service name with an empty method, so malformed requests still get
    /// observed under a stable label.
    pub fn from_path(path: &str) -> Self {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        match trimmed.split_once('/') {
            Some((service, method)) => Self {
                path: path.to_string(),
                service: service.to_string(),
                method: method.to_string(),
            },
            None => Self {
                path: path.to_string(),
                service: trimmed.to_string(),
                method: String::new(),
            },
        }
    }
}

/// Outcome of a completed (or abandoned) call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// gRPC status label, e.g. `OK` or `NOT_FOUND`. Calls dropped before
    /// completion report `CANCELLED`.
    pub code: &'static str,
    /// Wall time from dispatch to completion.
    pub elapsed: Duration,
}

impl CallOutcome {
    pub fn is_ok(&self) -> bool {
        self.code == "OK"
    }
}

/// A server-wide call interceptor.
///
/// `on_call` runs before the call is dispatched, `on_complete` exactly once
/// after the response (or its cancellation) is known. Implementations must be
/// cheap and non-blocking; they run on the request path.
pub trait CallInterceptor: fmt::Debug + Send + Sync {
    /// Unique name within the global category.
    fn name(&self) -> &str;

    fn on_call(&self, details: &CallDetails);

    fn on_complete(&self, details: &CallDetails, outcome: &CallOutcome);
}

/// Registry of interceptors grouped by category.
///
/// Only the global category exists today. Names are unique: the first
/// registration under a name wins and later ones are rejected, which lets a
/// manually registered interceptor take precedence over a conditional
/// registrar running later in the assembly.
#[derive(Debug, Default)]
pub struct InterceptorRegistry {
    global: Vec<Arc<dyn CallInterceptor>>,
}

impl InterceptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an interceptor in the global category.
    ///
    /// Returns false without registering when the name is already taken.
    pub fn register_global(&mut self, interceptor: Arc<dyn CallInterceptor>) -> bool {
        if self.contains(interceptor.name()) {
            debug!(
                name = interceptor.name(),
                "global interceptor already registered, keeping existing"
            );
            return false;
        }
        debug!(name = interceptor.name(), "registered global interceptor");
        self.global.push(interceptor);
        true
    }

    pub fn contains(&self, name: &str) -> bool {
        self.global.iter().any(|i| i.name() == name)
    }

    /// All global interceptors in registration order.
    pub fn global(&self) -> &[Arc<dyn CallInterceptor>] {
        &self.global
    }

    pub fn len(&self) -> usize {
        self.global.len()
    }

    pub fn is_empty(&self) -> bool {
        self.global.is_empty()
    }

    /// Shared snapshot handed to the server middleware.
    pub(crate) fn shared(&self) -> Arc<[Arc<dyn CallInterceptor>]> {
        self.global.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct NamedInterceptor(&'static str);

    impl CallInterceptor for NamedInterceptor {
        fn name(&self) -> &str {
            self.0
        }

        fn on_call(&self, _details: &CallDetails) {}

        fn on_complete(&self, _details: &CallDetails, _outcome: &CallOutcome) {}
    }

    #[test]
    fn test_parse_full_path() {
        let details = CallDetails::from_path("/grpc.health.v1.Health/Check");
        assert_eq!(details.service, "grpc.health.v1.Health");
        assert_eq!(details.method, "Check");
        assert_eq!(details.path, "/grpc.health.v1.Health/Check");
    }

    #[test]
    fn test_parse_degenerate_path() {
        let details = CallDetails::from_path("/oddball");
        assert_eq!(details.service, "oddball");
        assert_eq!(details.method, "");

        let empty = CallDetails::from_path("");
        assert_eq!(empty.service, "");
        assert_eq!(empty.method, "");
    }

    #[test]
    fn test_register_unique_names() {
        let mut registry = InterceptorRegistry::new();
        assert!(registry.register_global(Arc::new(NamedInterceptor("tracing"))));
        assert!(registry.register_global(Arc::new(NamedInterceptor("auth"))));
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("tracing"));
        assert!(registry.contains("auth"));
    }

    #[test]
    fn test_duplicate_name_backs_off() {
        let mut registry = InterceptorRegistry::new();
        let first: Arc<dyn CallInterceptor> = Arc::new(NamedInterceptor("observation"));
        assert!(registry.register_global(first.clone()));
        assert!(!registry.register_global(Arc::new(NamedInterceptor("observation"))));
        assert_eq!(registry.len(), 1);
        assert!(Arc::ptr_eq(&registry.global()[0], &first));
    }

    #[test]
    fn test_outcome_is_ok() {
        let ok = CallOutcome {
            code: "OK",
            elapsed: Duration::from_millis(3),
        };
        let cancelled = CallOutcome {
            code: "CANCELLED",
            elapsed: Duration::ZERO,
        };
        assert!(ok.is_ok());
        assert!(!cancelled.is_ok());
    }
}
