//! # Server
//!
//! Assembled gRPC server and its runtime lifecycle. The server is produced by
//! [`GrpcAssembly::build`] with all conditional wiring already decided; this
//! module only turns that decision record into a running tonic server on the
//! configured transport.
//!
//! Optional standard services follow the configuration: the gRPC health
//! service (`server.enable_health_service`, on by default) and server
//! reflection over all registered descriptor sets
//! (`server.enable_reflection`, off by default).

mod assembly;
mod middleware;

pub use assembly::GrpcAssembly;

use std::net::SocketAddr;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::service::Routes;
use tonic::transport::server::Router;
use tonic::transport::{Channel, Server};
use tower::layer::util::{Identity, Stack};
use tracing::{debug, info, warn};

use crate::config::{GrpcConfig, ServerConfig};
use crate::error::{AssemblyError, AssemblyResult};
use crate::interceptors::InterceptorRegistry;
use crate::transport::{InProcessConnector, InProcessTransport, TransportKind};

use self::middleware::ObservationLayer;

type ConfiguredRouter = Router<Stack<ObservationLayer, Identity>>;
type ServeResult = Result<(), tonic::transport::Error>;

/// An assembled server, ready to serve on its configured transport.
pub struct GrpcServer {
    config: GrpcConfig,
    interceptors: InterceptorRegistry,
    routes: Routes,
    descriptor_sets: Vec<&'static [u8]>,
}

impl GrpcServer {
    pub(crate) fn new(
        config: GrpcConfig,
        interceptors: InterceptorRegistry,
        routes: Routes,
        descriptor_sets: Vec<&'static [u8]>,
    ) -> Self {
        Self {
            config,
            interceptors,
            routes,
            descriptor_sets,
        }
    }

    pub fn config(&self) -> &GrpcConfig {
        &self.config
    }

    /// Global interceptors that assembly decided on, for inspection.
    pub fn interceptors(&self) -> &InterceptorRegistry {
        &self.interceptors
    }

    /// Transport this server will use, decided by `inprocess.enabled`.
    pub fn transport(&self) -> TransportKind {
        if self.config.inprocess.enabled {
            TransportKind::InProcess
        } else {
            TransportKind::Tcp
        }
    }

    /// Serve on the configured TCP address until the process ends.
    ///
    /// The in-process transport is only reachable through the handle that
    /// [`spawn`](Self::spawn) returns, so serving it here is rejected.
    pub async fn serve(self) -> AssemblyResult<()> {
        if self.config.inprocess.enabled {
            return Err(AssemblyError::InProcessRequiresSpawn);
        }
        let address = self.parse_bind_address()?;
        info!(address = %address, "starting gRPC server");
        let router = self.into_router().await?;
        router.serve(address).await?;
        Ok(())
    }

    /// Start the server in a background task and return its handle.
    pub async fn spawn(self) -> AssemblyResult<GrpcServerHandle> {
        let transport = self.transport();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        // Sender drop also resolves the receiver, so losing the handle shuts
        // the server down instead of leaking it.
        let shutdown = async move {
            let _ = shutdown_rx.await;
        };

        match transport {
            TransportKind::InProcess => {
                let (listener, connector) = InProcessTransport::new();
                let router = self.into_router().await?;
                let task = tokio::spawn(async move {
                    router
                        .serve_with_incoming_shutdown(listener.into_incoming(), shutdown)
                        .await
                });
                info!(transport = %TransportKind::InProcess, "gRPC server started");
                Ok(GrpcServerHandle {
                    transport,
                    bind_address: None,
                    connector: Some(connector),
                    shutdown_tx: Mutex::new(Some(shutdown_tx)),
                    task: Mutex::new(Some(task)),
                })
            }
            TransportKind::Tcp => {
                let address = self.parse_bind_address()?;
                let router = self.into_router().await?;
                let task =
                    tokio::spawn(async move { router.serve_with_shutdown(address, shutdown).await });
                info!(transport = %TransportKind::Tcp, address = %address, "gRPC server started");
                Ok(GrpcServerHandle {
                    transport,
                    bind_address: Some(address),
                    connector: None,
                    shutdown_tx: Mutex::new(Some(shutdown_tx)),
                    task: Mutex::new(Some(task)),
                })
            }
        }
    }

    fn parse_bind_address(&self) -> AssemblyResult<SocketAddr> {
        self.config.server.bind_address.parse().map_err(|e: std::net::AddrParseError| {
            AssemblyError::invalid_bind_address(self.config.server.bind_address.clone(), e.to_string())
        })
    }

    /// Attach optional standard services and the interceptor layer.
    async fn into_router(self) -> AssemblyResult<ConfiguredRouter> {
        let mut routes = self.routes;

        if self.config.server.enable_health_service {
            let (mut health_reporter, health_service) = tonic_health::server::health_reporter();
            health_reporter
                .set_service_status("", tonic_health::ServingStatus::Serving)
                .await;
            routes = routes.add_service(health_service);
            debug!("health service enabled");
        }

        if self.config.server.enable_reflection {
            let mut builder = tonic_reflection::server::Builder::configure()
                .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET);
            for descriptor_set in &self.descriptor_sets {
                builder = builder.register_encoded_file_descriptor_set(descriptor_set);
            }
            routes = routes.add_service(builder.build_v1()?);
            debug!(
                descriptor_sets = self.descriptor_sets.len() + 1,
                "reflection service enabled"
            );
        }

        let layer = ObservationLayer::new(self.interceptors.shared());
        Ok(configured_router(&self.config.server, layer, routes))
    }
}

fn configured_router(
    server: &ServerConfig,
    layer: ObservationLayer,
    routes: Routes,
) -> ConfiguredRouter {
    Server::builder()
        .http2_keepalive_interval(Some(Duration::from_secs(
            server.http2_keepalive_interval_seconds,
        )))
        .http2_keepalive_timeout(Some(Duration::from_secs(
            server.http2_keepalive_timeout_seconds,
        )))
        .max_concurrent_streams(Some(server.max_concurrent_streams))
        .max_frame_size(server.max_frame_size)
        .layer(layer)
        .add_routes(routes)
}

/// Handle to a spawned server.
///
/// The handle owns the shutdown signal: calling [`stop`](Self::stop) shuts
/// the server down gracefully, and dropping the handle has the same effect.
/// Handles are shareable behind `Arc`, which is how cached test contexts keep
/// one server alive across tests.
#[derive(Debug)]
pub struct GrpcServerHandle {
    transport: TransportKind,
    bind_address: Option<SocketAddr>,
    connector: Option<InProcessConnector>,
    shutdown_tx: Mutex<Option<oneshot::Sender<()>>>,
    task: Mutex<Option<JoinHandle<ServeResult>>>,
}

impl GrpcServerHandle {
    pub fn transport(&self) -> TransportKind {
        self.transport
    }

    /// Bound TCP address, `None` for in-process servers.
    pub fn bind_address(&self) -> Option<SocketAddr> {
        self.bind_address
    }

    /// Client channel to the in-process server.
    pub fn channel(&self) -> AssemblyResult<Channel> {
        match &self.connector {
            Some(connector) => Ok(connector.channel()),
            None => Err(AssemblyError::NoInProcessChannel),
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown_tx.lock().is_some()
    }

    /// Signal shutdown and wait for the server task to finish.
    ///
    /// Stopping twice is a no-op.
    pub async fn stop(&self) -> AssemblyResult<()> {
        let shutdown_tx = self.shutdown_tx.lock().take();
        let Some(shutdown_tx) = shutdown_tx else {
            debug!("gRPC server already stopped");
            return Ok(());
        };
        let _ = shutdown_tx.send(());

        let task = self.task.lock().take();
        if let Some(task) = task {
            match task.await {
                Ok(result) => result?,
                Err(e) => warn!(error = %e, "server task did not shut down cleanly"),
            }
        }
        info!("gRPC server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_selection() {
        let server = GrpcAssembly::new().build().unwrap();
        assert_eq!(server.transport(), TransportKind::Tcp);

        let server = GrpcAssembly::new()
            .with_property("inprocess.enabled", "true")
            .build()
            .unwrap();
        assert_eq!(server.transport(), TransportKind::InProcess);
    }

    #[tokio::test]
    async fn test_serve_rejects_in_process_transport() {
        let server = GrpcAssembly::new()
            .with_property("inprocess.enabled", "true")
            .build()
            .unwrap();
        assert!(matches!(
            server.serve().await,
            Err(AssemblyError::InProcessRequiresSpawn)
        ));
    }

    #[tokio::test]
    async fn test_spawn_rejects_invalid_bind_address() {
        let server = GrpcAssembly::new()
            .with_property("server.bind_address", "not-an-address")
            .build()
            .unwrap();
        assert!(matches!(
            server.spawn().await,
            Err(AssemblyError::InvalidBindAddress { .. })
        ));
    }
}
