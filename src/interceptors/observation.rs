//! Observation interceptor and its conditional registrar.
//!
//! The interceptor records per-call metrics through an externally supplied
//! [`ObservationRegistry`]. It is never constructed directly by applications;
//! the registrar decides during assembly whether one belongs on the server.

use std::fmt;
use std::sync::Arc;

use opentelemetry::metrics::{Counter, Histogram, UpDownCounter};
use opentelemetry::KeyValue;
use tracing::debug;

use super::{CallDetails, CallInterceptor, CallOutcome, InterceptorRegistry};
use crate::capabilities::CapabilitySet;
use crate::config::ObservationConfig;
use crate::metrics::{self, ObservationRegistry};

/// Name under which the registrar registers the interceptor. A manual
/// registration under the same name takes precedence.
pub const OBSERVATION_INTERCEPTOR_NAME: &str = "observation";

/// Records call counts, durations, and in-flight gauge per service/method.
pub struct ObservationInterceptor {
    calls_total: Counter<u64>,
    call_duration: Histogram<f64>,
    calls_active: UpDownCounter<i64>,
}

impl ObservationInterceptor {
    pub fn new(registry: &ObservationRegistry) -> Self {
        let meter = registry.meter();
        Self {
            calls_total: metrics::server::server_calls_total(meter),
            call_duration: metrics::server::server_call_duration(meter),
            calls_active: metrics::server::server_calls_active(meter),
        }
    }

    fn base_attributes(details: &CallDetails) -> [KeyValue; 2] {
        [
            KeyValue::new("rpc.service", details.service.clone()),
            KeyValue::new("rpc.method", details.method.clone()),
        ]
    }
}

impl fmt::Debug for ObservationInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationInterceptor").finish()
    }
}

impl CallInterceptor for ObservationInterceptor {
    fn name(&self) -> &str {
        OBSERVATION_INTERCEPTOR_NAME
    }

    fn on_call(&self, details: &CallDetails) {
        self.calls_active.add(1, &Self::base_attributes(details));
        debug!(
            service = %details.service,
            method = %details.method,
            "observing gRPC call"
        );
    }

    fn on_complete(&self, details: &CallDetails, outcome: &CallOutcome) {
        let [service, method] = Self::base_attributes(details);
        self.calls_active
            .add(-1, &[service.clone(), method.clone()]);
        let attributes = [service, method, KeyValue::new("grpc.code", outcome.code)];
        self.calls_total.add(1, &attributes);
        self.call_duration
            .record(outcome.elapsed.as_secs_f64() * 1000.0, &attributes);
        debug!(
            service = %details.service,
            method = %details.method,
            code = outcome.code,
            elapsed_ms = outcome.elapsed.as_millis() as u64,
            "gRPC call completed"
        );
    }
}

/// Conditionally register the observation interceptor in the global category.
///
/// Registration happens only when all three gates hold:
/// 1. an observation registry was supplied to the assembly,
/// 2. the `OBSERVATION` capability is present (and not masked),
/// 3. `server.observation.enabled` resolves to true, where an unset flag
///    defaults to the registry being present.
///
/// Unmet gates skip registration silently; this is expected wiring, not an
/// error. Returns whether an interceptor was registered.
pub(crate) fn register_observation_interceptor(
    interceptors: &mut InterceptorRegistry,
    registry: Option<&ObservationRegistry>,
    capabilities: CapabilitySet,
    config: &ObservationConfig,
) -> bool {
    let Some(registry) = registry else {
        debug!("observation registrar skipped: no observation registry supplied");
        return false;
    };
    if !capabilities.contains(CapabilitySet::OBSERVATION) {
        debug!("observation registrar skipped: observation capability not present");
        return false;
    }
    if !config.resolve(true) {
        debug!("observation registrar skipped: server.observation.enabled is false");
        return false;
    }

    let interceptor = Arc::new(ObservationInterceptor::new(registry));
    let registered = interceptors.register_global(interceptor);
    if registered {
        debug!("observation interceptor registered as global interceptor");
    }
    registered
}
