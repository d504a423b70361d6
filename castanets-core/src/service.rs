//! TLS-authenticated service dispatch: the server exchanges a token with
//! each connecting client before it will launch anything on their behalf;
//! the client drives the same handshake against every discovered server and
//! dispatches `service-request://` once connected.
//!
//! Grounded in `service_server.cpp` / `service_client.cpp`.

use std::net::SocketAddr;
use std::sync::Arc;

use castanets_net::tls::{no_verify_connector, ServerIdentity};
use castanets_wire::service::{self, ServiceMessage};
use rama_error::{ErrorContext, OpaqueError};
use rustls::pki_types::ServerName;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex as AsyncMutex;
use tokio_rustls::client::TlsStream as ClientTlsStream;
use tokio_rustls::server::TlsStream as ServerTlsStream;
use tracing::{debug, info, warn};

use crate::model::{ClientState, SharedClientState};

const RECV_BUF_SIZE: usize = 4096;

/// Prefix the original server stripped out of an incoming argument list,
/// since it re-derives `--enable-castanets` itself from the peer's real
/// source address rather than trust whatever the client sent
/// (`t_HandlePacket`).
const ENABLE_CASTANETS_PREFIX: &str = "--enable-castanets";

/// Issues a fresh per-connection authentication token
/// (`GetTokenFunc`/`get_token_`).
pub type GetToken = Arc<dyn Fn() -> String + Send + Sync>;

/// Validates a token presented by a peer (`VerifyTokenFunc`/`verify_token_`).
pub type VerifyToken = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Launches the requested renderer/service process with the given argv,
/// after the server has appended its own `--enable-castanets=<addr>` and
/// legacy `--server-address=<addr>` flags (`ServiceLauncher::LaunchRenderer`).
pub type Spawn = Arc<dyn Fn(Vec<String>) -> Result<(), OpaqueError> + Send + Sync>;

/// Accepts TLS connections, runs the token handshake, and dispatches
/// authorized `service-request://` packets to the injected launcher
/// (`CServiceServer`).
pub struct ServiceServer {
    listener: TcpListener,
    identity: Arc<ServerIdentity>,
    get_token: GetToken,
    verify_token: VerifyToken,
    spawn: Spawn,
}

impl ServiceServer {
    pub async fn bind(
        addr: SocketAddr,
        identity: Arc<ServerIdentity>,
        get_token: GetToken,
        verify_token: VerifyToken,
        spawn: Spawn,
    ) -> Result<Self, OpaqueError> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind service server on {addr}"))?;
        Ok(Self { listener, identity, get_token, verify_token, spawn })
    }

    /// The address actually bound, useful when `addr`'s port was `0`
    /// (ephemeral) in tests.
    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr().expect("bound listener has a local address")
    }

    pub async fn run(&self) -> Result<(), OpaqueError> {
        let acceptor = self.identity.acceptor().context("build TLS acceptor")?;
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .context("accept service connection")?;
            debug!(%peer, "service connection accepted");

            let tls_stream = match acceptor.accept(stream).await {
                Ok(s) => s,
                Err(err) => {
                    warn!(%peer, error = %err, "TLS handshake failed");
                    continue;
                }
            };

            let get_token = self.get_token.clone();
            let verify_token = self.verify_token.clone();
            let spawn = self.spawn.clone();
            tokio::spawn(async move {
                if let Err(err) = serve_connection(tls_stream, peer, get_token, verify_token, spawn).await {
                    warn!(%peer, error = %err, "service connection ended with error");
                }
            });
        }
    }
}

async fn serve_connection(
    mut stream: ServerTlsStream<TcpStream>,
    peer: SocketAddr,
    get_token: GetToken,
    verify_token: VerifyToken,
    spawn: Spawn,
) -> Result<(), OpaqueError> {
    // NOTIFY_ACCEPT: immediately offer our token (`CServiceServer::EventNotify`).
    let token = (get_token)();
    if !token.is_empty() {
        send_message(&mut stream, &service::encode_verify_token(&token)).await?;
    }

    let mut authorized = false;
    let mut buf = [0u8; RECV_BUF_SIZE];
    loop {
        let n = stream.read(&mut buf).await.context("read service message")?;
        if n == 0 {
            return Ok(());
        }

        match service::parse(&buf[..n]) {
            ServiceMessage::VerifyToken(peer_token) => {
                if (verify_token)(&peer_token) {
                    authorized = true;
                    send_message(&mut stream, &service::encode_verify_done()).await?;
                } else {
                    warn!(%peer, "invalid token, closing connection");
                    return Ok(());
                }
            }
            ServiceMessage::ServiceRequest(args) => {
                if !authorized {
                    warn!(%peer, "service request from unauthorized client");
                    continue;
                }
                let argv = rewrite_argv(args, peer);
                if let Err(err) = (spawn)(argv) {
                    warn!(%peer, error = %err, "renderer launch failed");
                }
            }
            ServiceMessage::VerifyDone | ServiceMessage::Unknown => {}
        }
    }
}

/// Drops any client-supplied `--enable-castanets` flag and appends the
/// server-derived address flags, exactly as `t_HandlePacket` +
/// `CServiceServer::DataRecv` do.
fn rewrite_argv(args: Vec<String>, peer: SocketAddr) -> Vec<String> {
    let mut argv: Vec<String> = args
        .into_iter()
        .filter(|arg| !arg.starts_with(ENABLE_CASTANETS_PREFIX))
        .collect();

    if argv.is_empty() {
        argv.push("_".to_string());
        argv.push("--type=renderer".to_string());
    }

    argv.push(format!("--enable-castanets={}", peer.ip()));
    argv.push(format!("--server-address={}", peer.ip()));
    argv
}

async fn send_message(stream: &mut ServerTlsStream<TcpStream>, message: &str) -> Result<(), OpaqueError> {
    stream
        .write_all(message.as_bytes())
        .await
        .context("write service message")
}

/// Client-side connection lifecycle to one discovered server
/// (`CServiceClient`).
pub struct ServiceClient {
    stream: AsyncMutex<ClientTlsStream<TcpStream>>,
    state: Arc<SharedClientState>,
}

impl ServiceClient {
    /// Opens the TLS connection and spawns the background task that drives
    /// the handshake state machine, returning a handle immediately so the
    /// registry can observe state transitions without blocking on them.
    pub async fn connect(
        addr: SocketAddr,
        get_token: GetToken,
        verify_token: VerifyToken,
        state: Arc<SharedClientState>,
    ) -> Result<Arc<Self>, OpaqueError> {
        let connector = no_verify_connector();
        let tcp = TcpStream::connect(addr)
            .await
            .with_context(|| format!("connect to service server {addr}"))?;
        let server_name = ServerName::IpAddress(addr.ip().into());
        let tls_stream = connector
            .connect(server_name, tcp)
            .await
            .context("TLS handshake with service server")?;

        let client = Arc::new(Self { stream: AsyncMutex::new(tls_stream), state });
        let handshake_client = client.clone();
        tokio::spawn(async move {
            if let Err(err) = handshake_client.drive_handshake(get_token, verify_token).await {
                warn!(error = %err, "service client handshake ended with error");
                handshake_client.state.set(ClientState::Disconnected);
            }
        });
        Ok(client)
    }

    async fn drive_handshake(&self, get_token: GetToken, verify_token: VerifyToken) -> Result<(), OpaqueError> {
        let mut buf = [0u8; RECV_BUF_SIZE];
        loop {
            let n = {
                let mut stream = self.stream.lock().await;
                stream.read(&mut buf).await.context("read service handshake message")?
            };
            if n == 0 {
                self.state.set(ClientState::Disconnected);
                return Ok(());
            }

            match service::parse(&buf[..n]) {
                ServiceMessage::VerifyToken(server_token) => {
                    if !(verify_token)(&server_token) {
                        info!("server token verification failed");
                        self.state.set(ClientState::Disconnected);
                        return Ok(());
                    }
                    let token = (get_token)();
                    if token.is_empty() {
                        self.state.set(ClientState::Disconnected);
                        return Ok(());
                    }
                    let mut stream = self.stream.lock().await;
                    stream
                        .write_all(service::encode_verify_token(&token).as_bytes())
                        .await
                        .context("send our token")?;
                    self.state.set(ClientState::Connecting);
                }
                ServiceMessage::VerifyDone => {
                    self.state.set(ClientState::Connected);
                }
                ServiceMessage::ServiceRequest(_) | ServiceMessage::Unknown => {}
            }
        }
    }

    /// Sends `service-request://<args>` once the handshake has completed
    /// (`RequestRunService` calling `DataSend` in `client_runner.cpp`).
    pub async fn dispatch(&self, args: &[String]) -> Result<(), OpaqueError> {
        if self.state.get() != ClientState::Connected {
            return Err(rama_error::OpaqueError::from_display(
                "service client is not connected",
            ));
        }
        let message = service::encode_service_request(args);
        let mut stream = self.stream.lock().await;
        stream
            .write_all(message.as_bytes())
            .await
            .context("send service request")
    }
}
