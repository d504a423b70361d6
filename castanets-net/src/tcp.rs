//! Thin TCP helpers. The monitor and service subsystems own their accept/
//! connect loops in `castanets-core`; this module only centralizes the
//! socket-level setup (bind/connect plus the context string attached to
//! any failure) so every caller reports errors the same way.

use std::net::SocketAddr;

use rama_error::{ErrorContext, OpaqueError};
use tokio::net::{TcpListener, TcpStream};

pub async fn listen(addr: SocketAddr) -> Result<TcpListener, OpaqueError> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind TCP listener on {addr}"))
}

pub async fn connect(addr: SocketAddr) -> Result<TcpStream, OpaqueError> {
    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("connect TCP stream to {addr}"))?;
    stream.set_nodelay(true).context("set TCP_NODELAY")?;
    Ok(stream)
}
