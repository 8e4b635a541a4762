#![cfg(feature = "observation")]

//! Conditional observation registrar tests.
//!
//! The registrar wires the observation interceptor only when an observation
//! registry is supplied, the observation capability is present, and
//! `server.observation.enabled` resolves to true (an unset flag follows the
//! registry). Every unmet gate is a silent skip, never an error. These tests
//! walk the full decision matrix through the public assembly surface.

use std::sync::Arc;

use anyhow::Result;
use gantry_grpc::interceptors::observation::OBSERVATION_INTERCEPTOR_NAME;
use gantry_grpc::testing::AssemblyRunner;
use gantry_grpc::{
    CallDetails, CallInterceptor, CallOutcome, CapabilitySet, GrpcAssembly, ObservationRegistry,
};

/// Build a server through the runner and report its global interceptor names.
fn interceptor_names(
    registry: bool,
    observation_capability: bool,
    flag: Option<&str>,
) -> Result<Vec<String>> {
    let mut runner = AssemblyRunner::new();
    if registry {
        runner = runner.with_observation_registry(ObservationRegistry::global());
    }
    if !observation_capability {
        runner = runner.without_capability(CapabilitySet::OBSERVATION);
    }
    if let Some(value) = flag {
        runner = runner.with_property("server.observation.enabled", value);
    }
    let names = runner.run(|server| {
        server
            .interceptors()
            .global()
            .iter()
            .map(|interceptor| interceptor.name().to_string())
            .collect()
    })?;
    Ok(names)
}

#[test]
fn test_registers_exactly_one_interceptor_when_all_gates_hold() -> Result<()> {
    let names = interceptor_names(true, true, Some("true"))?;
    assert_eq!(names, vec![OBSERVATION_INTERCEPTOR_NAME.to_string()]);
    Ok(())
}

#[test]
fn test_unset_flag_follows_registry_presence() -> Result<()> {
    // Registry supplied, flag unset: registration defaults on.
    let names = interceptor_names(true, true, None)?;
    assert_eq!(names, vec![OBSERVATION_INTERCEPTOR_NAME.to_string()]);

    // No registry, flag unset: nothing to register.
    let names = interceptor_names(false, true, None)?;
    assert!(names.is_empty());
    Ok(())
}

#[test]
fn test_explicit_false_disables_despite_registry() -> Result<()> {
    let names = interceptor_names(true, true, Some("false"))?;
    assert!(
        names.is_empty(),
        "explicit false must win over registry presence, got {names:?}"
    );
    Ok(())
}

#[test]
fn test_missing_registry_skips_silently() -> Result<()> {
    // The build succeeds; the unmet gate is expected wiring, not an error.
    let names = interceptor_names(false, true, Some("true"))?;
    assert!(names.is_empty());
    Ok(())
}

#[test]
fn test_masked_capability_skips_despite_registry_and_flag() -> Result<()> {
    let names = interceptor_names(true, false, Some("true"))?;
    assert!(names.is_empty());
    Ok(())
}

#[test]
fn test_full_decision_matrix() -> Result<()> {
    for registry in [false, true] {
        for capability in [false, true] {
            for flag in [None, Some("true"), Some("false")] {
                let flag_resolves = match flag {
                    Some(value) => value == "true",
                    None => registry,
                };
                let expected = registry && capability && flag_resolves;

                let names = interceptor_names(registry, capability, flag)?;
                assert_eq!(
                    names.contains(&OBSERVATION_INTERCEPTOR_NAME.to_string()),
                    expected,
                    "registry={registry} capability={capability} flag={flag:?}"
                );
                assert!(
                    names.len() <= 1,
                    "at most one interceptor may be registered, got {names:?}"
                );
            }
        }
    }
    Ok(())
}

#[test]
fn test_repeated_builds_never_duplicate() -> Result<()> {
    let runner = AssemblyRunner::new().with_observation_registry(ObservationRegistry::global());
    for _ in 0..3 {
        let count = runner.run(|server| server.interceptors().len())?;
        assert_eq!(count, 1);
    }
    Ok(())
}

#[derive(Debug)]
struct ManualObservation;

impl CallInterceptor for ManualObservation {
    fn name(&self) -> &str {
        OBSERVATION_INTERCEPTOR_NAME
    }

    fn on_call(&self, _details: &CallDetails) {}

    fn on_complete(&self, _details: &CallDetails, _outcome: &CallOutcome) {}
}

#[test]
fn test_manual_registration_under_the_same_name_wins() -> Result<()> {
    let manual: Arc<dyn CallInterceptor> = Arc::new(ManualObservation);
    let server = GrpcAssembly::new()
        .register_global_interceptor(manual.clone())
        .with_observation_registry(ObservationRegistry::global())
        .with_property("server.observation.enabled", "true")
        .build()?;

    let globals = server.interceptors().global();
    assert_eq!(globals.len(), 1, "registrar must back off, not stack");
    assert!(Arc::ptr_eq(&globals[0], &manual));
    Ok(())
}

#[test]
fn test_manual_interceptor_under_other_name_coexists() -> Result<()> {
    #[derive(Debug)]
    struct Audit;

    impl CallInterceptor for Audit {
        fn name(&self) -> &str {
            "audit"
        }

        fn on_call(&self, _details: &CallDetails) {}

        fn on_complete(&self, _details: &CallDetails, _outcome: &CallOutcome) {}
    }

    let server = GrpcAssembly::new()
        .register_global_interceptor(Arc::new(Audit))
        .with_observation_registry(ObservationRegistry::global())
        .build()?;

    assert_eq!(server.interceptors().len(), 2);
    assert!(server.interceptors().contains("audit"));
    assert!(server.interceptors().contains(OBSERVATION_INTERCEPTOR_NAME));
    Ok(())
}

#[test]
fn test_flag_resolves_through_property_layers() -> Result<()> {
    // The flag participates in normal layered resolution: an env-layer value
    // is visible to the registrar like any other property.
    std::env::set_var("GANTRY_REGISTRAR_IT__SERVER__OBSERVATION__ENABLED", "false");
    let names = AssemblyRunner::new()
        .with_env_prefix("GANTRY_REGISTRAR_IT")
        .with_observation_registry(ObservationRegistry::global())
        .run(|server| {
            server
                .interceptors()
                .global()
                .iter()
                .map(|interceptor| interceptor.name().to_string())
                .collect::<Vec<_>>()
        })?;
    std::env::remove_var("GANTRY_REGISTRAR_IT__SERVER__OBSERVATION__ENABLED");
    assert!(names.is_empty());
    Ok(())
}
