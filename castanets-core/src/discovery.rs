//! Multicast discovery: the server answers `QUERY-SERVICE` with its
//! service/monitor ports and capability string; the client broadcasts the
//! query and folds responses into a `ServiceProvider`.
//!
//! Grounded in `discovery_server.cpp` / `discovery_client.cpp`.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;

use castanets_net::udp::MulticastSocket;
use castanets_net::DEFAULT_MULTICAST_TTL;
use castanets_wire::discovery::{self, DiscoveryResponse};
use rama_error::{ErrorContext, OpaqueError};
use tracing::{debug, info, warn};

const RECV_BUF_SIZE: usize = 2048;

/// Called once per accepted connection to learn what this server can run
/// (`CDiscoveryServer::SetServiceParam`'s `get_capability_`). Supplied by
/// the embedder (`castanets-runner`); `castanets-cli` wires in a default
/// that reports an empty capability string.
pub type GetCapability = Arc<dyn Fn() -> String + Send + Sync>;

/// Answers `QUERY-SERVICE` multicast queries with this host's service and
/// monitor ports (`CDiscoveryServer`).
pub struct DiscoveryServer {
    socket: MulticastSocket,
    service_port: u16,
    monitor_port: u16,
    get_capability: GetCapability,
}

impl DiscoveryServer {
    pub async fn bind(
        group: Ipv4Addr,
        port: u16,
        service_port: u16,
        monitor_port: u16,
        get_capability: GetCapability,
    ) -> Result<Self, OpaqueError> {
        let socket = MulticastSocket::bind_and_join(group, port)
            .await
            .context("bind discovery server multicast socket")?;
        Ok(Self { socket, service_port, monitor_port, get_capability })
    }

    /// The port actually bound, useful when `port` was `0` (ephemeral) in
    /// tests.
    pub fn socket_port(&self) -> u16 {
        self.socket.local_addr().expect("bound socket has a local address").port()
    }

    /// Runs the receive loop until cancelled. Each query gets one unicast
    /// reply to the sender's address (`CDiscoveryServer::DataRecv`).
    pub async fn run(&self) -> Result<(), OpaqueError> {
        let mut buf = [0u8; RECV_BUF_SIZE];
        loop {
            let (n, from) = self
                .socket
                .recv_from(&mut buf)
                .await
                .context("receive discovery query")?;
            let payload = &buf[..n];
            if !discovery::is_query(payload) {
                continue;
            }
            debug!(%from, "received discovery query");

            let capability = (self.get_capability)();
            let response = discovery::encode_response(
                self.service_port,
                self.monitor_port,
                &from.ip().to_string(),
                &capability,
            );
            if let Err(err) = self.socket.send_to(&response, from).await {
                warn!(%from, error = %err, "failed to send discovery response");
            }
        }
    }
}

/// Outcome of a single discovery response, passed to the caller for
/// registration in a `ServiceProvider` (`CDiscoveryClient::DataRecv`).
#[derive(Debug, Clone)]
pub struct Discovered {
    pub address: IpAddr,
    pub response: DiscoveryResponse,
}

/// Broadcasts `QUERY-SERVICE` on the multicast group and reports back every
/// response that isn't our own (`CDiscoveryClient`).
pub struct DiscoveryClient {
    socket: MulticastSocket,
    group_addr: SocketAddr,
    self_discovery_enabled: bool,
}

impl DiscoveryClient {
    pub async fn bind(group: Ipv4Addr, port: u16, self_discovery_enabled: bool) -> Result<Self, OpaqueError> {
        let socket = MulticastSocket::bind_ephemeral()
            .await
            .context("bind discovery client socket")?;
        socket
            .set_ttl(DEFAULT_MULTICAST_TTL)
            .context("set discovery client multicast TTL")?;
        Ok(Self {
            socket,
            group_addr: SocketAddr::new(IpAddr::V4(group), port),
            self_discovery_enabled,
        })
    }

    pub async fn send_query(&self) -> Result<(), OpaqueError> {
        self.socket
            .send_to(&discovery::encode_query(), self.group_addr)
            .await
            .context("send discovery query")?;
        Ok(())
    }

    /// Blocks for the next response, filtering out replies that echo our
    /// own request (`self_discovery_enabled_` check in the original).
    pub async fn recv_response(&self) -> Result<Option<Discovered>, OpaqueError> {
        let mut buf = [0u8; RECV_BUF_SIZE];
        let (n, from) = self
            .socket
            .recv_from(&mut buf)
            .await
            .context("receive discovery response")?;

        let Some(response) = discovery::parse_response(&buf[..n]) else {
            return Ok(None);
        };

        let is_self = response
            .request_from
            .as_deref()
            .is_some_and(|addr| addr == from.ip().to_string());
        if !self.self_discovery_enabled && is_self {
            return Ok(None);
        }

        info!(%from, service_port = response.service_port, "discovered server");
        Ok(Some(Discovered { address: from.ip(), response }))
    }
}
