#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow builder methods without must_use when context is clear

//! # Gantry gRPC
//!
//! Configuration-driven assembly for tonic gRPC servers.
//!
//! ## Overview
//!
//! An assembly collects property sources, services, and interceptors, then
//! decides the rest of the wiring from configuration and build capabilities:
//! whether an observation interceptor instruments every call, whether the
//! standard health and reflection services are mounted, and whether the
//! server binds a TCP socket or serves an in-memory transport for tests.
//!
//! Conditional wiring is deliberately silent: when a gate does not hold (no
//! observation registry supplied, capability compiled out, flag disabled) the
//! corresponding component is simply absent, which is the expected steady
//! state rather than an error.
//!
//! ## Module Organization
//!
//! - [`server`] - Assembly builder, assembled server, spawn/stop lifecycle
//! - [`config`] - Typed configuration tree and layered property sources
//! - [`capabilities`] - Build capability probing and per-assembly masking
//! - [`interceptors`] - Global call interceptors and their registry
//! - [`transport`] - TCP and in-process transport selection
//! - [`testing`] - Fixtures, context customizers, context cache, runner
//! - [`metrics`] - Observation registry and OTLP exporter bootstrap
//! - [`logging`] - Console logging initialization
//! - [`error`] - Assembly and server lifecycle errors
//!
//! ## Quick Start
//!
//! ```rust
//! use gantry_grpc::GrpcAssembly;
//!
//! # fn main() -> Result<(), gantry_grpc::AssemblyError> {
//! let server = GrpcAssembly::new()
//!     .with_property("server.bind_address", "127.0.0.1:50051")
//!     .build()?;
//!
//! assert!(server.config().server.enable_health_service);
//! # Ok(())
//! # }
//! ```
//!
//! Serving blocks until shutdown, so production processes usually hand the
//! server to the runtime directly:
//!
//! ```rust,no_run
//! use gantry_grpc::GrpcAssembly;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), gantry_grpc::AssemblyError> {
//! gantry_grpc::logging::init();
//! GrpcAssembly::new().build()?.serve().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Integration tests go through [`testing::AssemblyRunner`], which applies
//! per-test fixtures via context customizers and can share running servers
//! between equally configured tests through [`testing::ContextCache`].

pub mod capabilities;
pub mod config;
pub mod error;
pub mod interceptors;
pub mod logging;
#[cfg(feature = "observation")]
pub mod metrics;
pub mod server;
pub mod testing;
pub mod transport;

pub use capabilities::CapabilitySet;
pub use config::{ConfigError, ConfigResult, GrpcConfig, PropertySources};
pub use error::{AssemblyError, AssemblyResult};
pub use interceptors::{CallDetails, CallInterceptor, CallOutcome, InterceptorRegistry};
#[cfg(feature = "observation")]
pub use metrics::ObservationRegistry;
pub use server::{GrpcAssembly, GrpcServer, GrpcServerHandle};
pub use transport::TransportKind;
