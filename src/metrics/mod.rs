//! # Metrics
//!
//! OpenTelemetry integration for the observation interceptor. Two concerns
//! live here: the [`ObservationRegistry`] handle that assemblies receive, and
//! an optional OTLP exporter bootstrap for processes that want their metrics
//! shipped somewhere.
//!
//! The registry is only a meter handle. Tests hand
//! [`ObservationRegistry::global()`] to assemblies without initializing any
//! exporter; instruments recorded against the global provider are no-ops
//! until [`init_metrics`] installs one.

pub mod server;

use std::fmt;
use std::sync::OnceLock;
use std::time::Duration;

use opentelemetry::global;
use opentelemetry::metrics::Meter;
use opentelemetry::KeyValue;
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::{runtime, Resource};
use tracing::{debug, info, warn};

const METER_NAME: &str = "gantry_grpc";

/// Handle to a metrics backend, supplied externally to server assemblies.
///
/// Presence of a registry is one of the gates for the observation registrar,
/// so this type is deliberately cheap to clone and carries no configuration
/// of its own.
#[derive(Clone)]
pub struct ObservationRegistry {
    meter: Meter,
}

impl ObservationRegistry {
    pub fn new(meter: Meter) -> Self {
        Self { meter }
    }

    /// Registry backed by the process-global meter provider.
    pub fn global() -> Self {
        Self {
            meter: global::meter_provider().meter(METER_NAME),
        }
    }

    pub fn meter(&self) -> &Meter {
        &self.meter
    }
}

impl fmt::Debug for ObservationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObservationRegistry").finish()
    }
}

/// Exporter settings resolved from the environment.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// `TELEMETRY_ENABLED`, default false.
    pub enabled: bool,
    /// `OTEL_SERVICE_NAME`, default `gantry-grpc`.
    pub service_name: String,
    /// `OTEL_EXPORTER_OTLP_ENDPOINT`, default `http://localhost:4317`.
    pub otlp_endpoint: String,
    /// `METRICS_EXPORT_INTERVAL_SECONDS`, default 30.
    pub export_interval_seconds: u64,
}

impl MetricsConfig {
    pub fn from_env() -> Self {
        Self {
            enabled: std::env::var("TELEMETRY_ENABLED")
                .map(|v| v.to_lowercase() == "true")
                .unwrap_or(false),
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "gantry-grpc".to_string()),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            export_interval_seconds: std::env::var("METRICS_EXPORT_INTERVAL_SECONDS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
        }
    }
}

static METRICS_INITIALIZED: OnceLock<bool> = OnceLock::new();

/// Initialize the OTLP metrics exporter once per process.
///
/// Disabled or failed initialization leaves the global provider untouched,
/// so instruments keep working as no-ops. Returns whether an exporter is
/// installed.
pub fn init_metrics() -> bool {
    *METRICS_INITIALIZED.get_or_init(|| {
        let config = MetricsConfig::from_env();
        if !config.enabled {
            debug!("📊 Telemetry disabled, metrics will not be exported");
            return false;
        }
        match install_meter_provider(&config) {
            Ok(()) => {
                info!(
                    endpoint = %config.otlp_endpoint,
                    service_name = %config.service_name,
                    interval_seconds = config.export_interval_seconds,
                    "📊 OpenTelemetry metrics exporter installed"
                );
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to install metrics exporter, continuing without");
                false
            }
        }
    })
}

fn install_meter_provider(
    config: &MetricsConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(&config.otlp_endpoint)
        .build()?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(Duration::from_secs(config.export_interval_seconds))
        .build();

    let provider = SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(Resource::new(vec![KeyValue::new(
            "service.name",
            config.service_name.clone(),
        )]))
        .build();

    global::set_meter_provider(provider);
    Ok(())
}
