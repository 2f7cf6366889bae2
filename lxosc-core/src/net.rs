//! Socket plumbing shared by the receiver and transmitter.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, Shutdown, SocketAddr, ToSocketAddrs, UdpSocket};

use socket2::{Domain, Protocol, SockRef, Socket, Type};
use tracing::debug;

/// Create a UDP socket bound to `addr`. Address reuse stays off so a port
/// that is already taken fails here instead of silently sharing traffic.
pub(crate) fn bind_udp(addr: SocketAddr, broadcast: bool) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
    if addr.is_ipv6() {
        socket.set_only_v6(false).ok();
    }
    if broadcast {
        socket.set_broadcast(true)?;
    }
    socket.bind(&addr.into())?;
    Ok(socket.into())
}

/// Resolve `host` to a socket address, preferring IPv4 results.
/// `None` means the name could not be resolved.
pub fn resolve_host(host: &str, port: u16) -> Option<SocketAddr> {
    let host = host.trim();
    if host.is_empty() {
        return None;
    }
    let candidates: Vec<SocketAddr> = match (host, port).to_socket_addrs() {
        Ok(addrs) => addrs.collect(),
        Err(e) => {
            debug!("Could not resolve '{host}': {e}");
            return None;
        }
    };
    candidates
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
}

/// The wildcard address of the same family as `addr`, on an ephemeral port.
pub(crate) fn unspecified_for(addr: SocketAddr) -> SocketAddr {
    match addr {
        SocketAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
        SocketAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
    }
}

/// Where to send a datagram so that a socket bound to `local` receives it.
pub(crate) fn self_address(local: SocketAddr) -> SocketAddr {
    let ip = match local.ip() {
        IpAddr::V4(ip) if ip.is_unspecified() => IpAddr::V4(Ipv4Addr::LOCALHOST),
        IpAddr::V6(ip) if ip.is_unspecified() => IpAddr::V6(Ipv6Addr::LOCALHOST),
        ip => ip,
    };
    SocketAddr::new(ip, local.port())
}

/// Shut down the read half so a `recv_from` blocked on another thread
/// returns. Linux reports `NotConnected` for unconnected UDP sockets but
/// still wakes the reader, so that error is ignored.
pub(crate) fn shutdown_read(socket: &UdpSocket) -> io::Result<()> {
    match SockRef::from(socket).shutdown(Shutdown::Read) {
        Err(e) if e.kind() != io::ErrorKind::NotConnected => Err(e),
        _ => Ok(()),
    }
}
