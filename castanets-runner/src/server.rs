//! Server-side process lifecycle: bind discovery, monitoring and service
//! dispatch, then run until a shutdown signal arrives.
//!
//! Grounded in `server_runner.cpp`'s `ServerRunner::Run`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use castanets_config::ServerConfig;
use castanets_core::discovery::{DiscoveryServer, GetCapability};
use castanets_core::monitor::MonitorServer;
use castanets_core::service::{GetToken, ServiceServer, Spawn, VerifyToken};
use castanets_net::tls::{ServerIdentity, SHUTDOWN_JOIN_TIMEOUT};
use rama_error::{ErrorContext, OpaqueError};
use tokio_graceful::Shutdown;
use tracing::{info, warn};

/// Callbacks a server-side embedder supplies (spec.md §6.4): the original's
/// D-Bus/JNI front door is out of scope, but this is the seam it would wire
/// into. `castanets-cli` provides standalone defaults so the binary runs
/// without an embedder.
pub struct ServerCallbacks {
    pub get_token: GetToken,
    pub verify_token: VerifyToken,
    pub get_capability: GetCapability,
    pub spawn: Spawn,
}

/// Owns the configuration and callbacks for one server process
/// (`ServerRunner`).
pub struct ServerRunner {
    config: ServerConfig,
    callbacks: ServerCallbacks,
}

impl ServerRunner {
    pub fn new(config: ServerConfig, callbacks: ServerCallbacks) -> Self {
        Self { config, callbacks }
    }

    /// Binds every subsystem and runs until shutdown, waiting up to
    /// [`SHUTDOWN_JOIN_TIMEOUT`] for in-flight connections to drain
    /// (`server_runner.cpp`'s `while (true) { ... }` main loop plus its
    /// teardown sequence).
    pub async fn run(self) -> Result<(), OpaqueError> {
        let identity = Arc::new(ServerIdentity::generate().context("generate service TLS identity")?);

        let discovery = DiscoveryServer::bind(
            self.config.multicast_address,
            self.config.multicast_port,
            self.config.service_port,
            self.config.monitor_port,
            self.callbacks.get_capability,
        )
        .await
        .context("bind discovery server")?;

        let monitor = Arc::new(
            MonitorServer::bind(unspecified(self.config.monitor_port))
                .await
                .context("bind monitor server")?,
        );

        let service = ServiceServer::bind(
            unspecified(self.config.service_port),
            identity,
            self.callbacks.get_token,
            self.callbacks.verify_token,
            self.callbacks.spawn,
        )
        .await
        .context("bind service server")?;

        info!(
            multicast = %self.config.multicast_address,
            multicast_port = self.config.multicast_port,
            service_port = self.config.service_port,
            monitor_port = self.config.monitor_port,
            "server runner starting",
        );

        let shutdown = Shutdown::default();

        shutdown.spawn_task_fn(async move |_guard| {
            if let Err(err) = discovery.run().await {
                warn!(error = %err, "discovery server loop ended");
            }
        });

        let sampler_handle = monitor.clone();
        shutdown.spawn_task_fn(async move |_guard| {
            sampler_handle.run_sampler().await;
        });

        shutdown.spawn_task_fn(async move |_guard| {
            if let Err(err) = monitor.run().await {
                warn!(error = %err, "monitor server loop ended");
            }
        });

        shutdown.spawn_task_fn(async move |_guard| {
            if let Err(err) = service.run().await {
                warn!(error = %err, "service server loop ended");
            }
        });

        shutdown
            .shutdown_with_limit(SHUTDOWN_JOIN_TIMEOUT)
            .await
            .context("graceful shutdown of server runner")?;
        Ok(())
    }
}

fn unspecified(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)
}
