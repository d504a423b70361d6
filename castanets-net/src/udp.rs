//! UDP multicast socket: bind, join a class-D group, set TTL, send/receive
//! with the sender's address visible on receive.
//!
//! `tokio::net::UdpSocket` does not expose `IP_ADD_MEMBERSHIP` directly for
//! every platform knob this needs, so the socket is built with `socket2`
//! (as `rama-net` does for its own low-level socket options) and converted
//! into a `tokio::net::UdpSocket` afterward.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

use rama_error::{ErrorContext, ErrorExt, OpaqueError};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// A UDP socket joined to a multicast group, used by both the discovery
/// server (bound to the group, receiving queries) and the discovery client
/// (sending queries, receiving unicast responses on an ephemeral port).
pub struct MulticastSocket {
    inner: UdpSocket,
}

impl MulticastSocket {
    /// Binds to `port` on all interfaces and joins `group`.
    ///
    /// Used by the discovery server: it must receive datagrams addressed to
    /// the multicast group itself.
    pub async fn bind_and_join(group: Ipv4Addr, port: u16) -> Result<Self, OpaqueError> {
        let socket = new_socket().context("create multicast socket")?;
        socket
            .set_reuse_address(true)
            .context("set SO_REUSEADDR")?;
        let bind_addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket
            .bind(&bind_addr.into())
            .with_context(|| format!("bind multicast socket to {bind_addr}"))?;
        socket
            .join_multicast_v4(&group, &Ipv4Addr::UNSPECIFIED)
            .with_context(|| format!("join multicast group {group}"))?;
        socket.set_nonblocking(true).context("set nonblocking")?;

        let inner = UdpSocket::from_std(socket.into()).context("adopt socket into tokio runtime")?;
        Ok(Self { inner })
    }

    /// Binds an ephemeral send/receive socket, not joined to any group.
    ///
    /// Used by the discovery client: it only ever sends to the group and
    /// receives unicast replies back on whatever port it bound.
    pub async fn bind_ephemeral() -> Result<Self, OpaqueError> {
        let socket = new_socket().context("create discovery client socket")?;
        socket
            .bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into())
            .context("bind ephemeral UDP socket")?;
        socket.set_nonblocking(true).context("set nonblocking")?;

        let inner = UdpSocket::from_std(socket.into()).context("adopt socket into tokio runtime")?;
        Ok(Self { inner })
    }

    /// Sets the outgoing multicast TTL (spec.md §4.3: 64 for discovery queries).
    pub fn set_ttl(&self, ttl: u32) -> io::Result<()> {
        self.inner.set_multicast_ttl_v4(ttl)
    }

    pub async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        self.inner.send_to(buf, target).await
    }

    /// Receives one datagram, returning its payload and the sender's
    /// address — the source address is how the discovery server learns who
    /// to unicast its response to.
    pub async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        self.inner.recv_from(buf).await
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

fn new_socket() -> io::Result<Socket> {
    Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_and_receive_round_trip() {
        let group: Ipv4Addr = "239.255.7.7".parse().unwrap();
        let server = MulticastSocket::bind_and_join(group, 0).await.unwrap();
        let server_addr = server.local_addr().unwrap();

        let client = MulticastSocket::bind_ephemeral().await.unwrap();
        client.set_ttl(1).unwrap();

        client.send_to(b"hello\0", server_addr).await.unwrap();

        let mut buf = [0u8; 64];
        let (n, from) = server.recv_from(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"hello\0");
        assert_eq!(from.ip(), client.local_addr().unwrap().ip());
    }
}
