//! Server call instruments.
//!
//! Constructor functions for the instruments recorded by the observation
//! interceptor. Label sets are documented on each instrument; cardinality is
//! bounded by the number of exposed service methods plus the gRPC status
//! codes.

use opentelemetry::metrics::{Counter, Histogram, Meter, UpDownCounter};

/// Total completed calls, labeled by `rpc.service`, `rpc.method`, `grpc.code`.
pub fn server_calls_total(meter: &Meter) -> Counter<u64> {
    meter
        .u64_counter("grpc.server.calls.total")
        .with_description("Total gRPC server calls completed")
        .build()
}

/// Call duration in milliseconds, labeled like `grpc.server.calls.total`.
pub fn server_call_duration(meter: &Meter) -> Histogram<f64> {
    meter
        .f64_histogram("grpc.server.call.duration")
        .with_description("gRPC server call duration from dispatch to completion")
        .with_unit("ms")
        .build()
}

/// Calls currently in flight, labeled by `rpc.service` and `rpc.method`.
pub fn server_calls_active(meter: &Meter) -> UpDownCounter<i64> {
    meter
        .i64_up_down_counter("grpc.server.calls.active")
        .with_description("gRPC server calls currently in flight")
        .build()
}
