//! Connection utilities.
//!
//! Address parsing for direct sends, local interface detection used by
//! discovery to recognise its own datagrams, and TCP socket tuning.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket as StdUdpSocket};
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::TcpStream;

use crate::error::{Error, Result};

/// Well-known public resolvers used only to learn the outbound interface.
/// No packet is sent: connecting a UDP socket just selects a route.
const ROUTE_PROBE_TARGETS: [&str; 2] = ["8.8.8.8:53", "1.1.1.1:53"];

/// Parse a host address string into a `SocketAddr`.
///
/// Accepts formats:
/// - `IP` (e.g., `192.168.1.100`) - uses `default_port`
/// - `IP:PORT` (e.g., `192.168.1.100:9001`) - uses specified port
/// - `[IPv6]` (e.g., `[::1]`) - uses `default_port`
/// - `[IPv6]:PORT` (e.g., `[::1]:9001`) - uses specified port
///
/// # Examples
///
/// ```
/// use p2pshare_core::connection::parse_host_address;
///
/// let addr = parse_host_address("192.168.1.100", 9000).unwrap();
/// assert_eq!(addr.port(), 9000);
///
/// let addr = parse_host_address("192.168.1.100:9001", 9000).unwrap();
/// assert_eq!(addr.port(), 9001);
/// ```
///
/// # Errors
///
/// Returns an error if the host string cannot be parsed.
pub fn parse_host_address(host: &str, default_port: u16) -> Result<SocketAddr> {
    let host = host.trim();

    if let Ok(addr) = host.parse::<SocketAddr>() {
        return Ok(addr);
    }

    if let Some(ip_str) = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')) {
        let ip: IpAddr = ip_str.parse().map_err(|_| invalid_host(host))?;
        return Ok(SocketAddr::new(ip, default_port));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }

    if let Some((ip_part, port_part)) = host.rsplit_once(':') {
        if !ip_part.contains(':') {
            let ip: IpAddr = ip_part.parse().map_err(|_| invalid_host(host))?;
            let port: u16 = port_part.parse().map_err(|_| {
                Error::InvalidInput(format!(
                    "Invalid port '{port_part}'. Port must be a number between 1 and 65535"
                ))
            })?;
            return Ok(SocketAddr::new(ip, port));
        }
    }

    Err(invalid_host(host))
}

fn invalid_host(host: &str) -> Error {
    Error::InvalidInput(format!(
        "Invalid host format '{host}'. Use IP or IP:PORT (e.g., 192.168.1.100 or 192.168.1.100:9000)"
    ))
}

/// Non-loopback IPv4 addresses of this host, primary interface first.
///
/// Uses the connect-a-UDP-socket trick: the kernel picks the outbound
/// interface and `local_addr` reveals it. Returns an empty list on hosts
/// without a default route.
pub fn local_ipv4_addresses() -> Vec<Ipv4Addr> {
    let mut addresses = Vec::new();

    let Ok(socket) = StdUdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)) else {
        return addresses;
    };

    for target in ROUTE_PROBE_TARGETS {
        if socket.connect(target).is_err() {
            continue;
        }
        if let Ok(SocketAddr::V4(local)) = socket.local_addr() {
            let ip = *local.ip();
            if !ip.is_loopback() && !ip.is_unspecified() && !addresses.contains(&ip) {
                addresses.push(ip);
            }
        }
    }

    addresses
}

/// Directed broadcast address of `ip`, assuming a /24 subnet.
#[must_use]
pub fn directed_broadcast(ip: Ipv4Addr) -> Ipv4Addr {
    let [a, b, c, _] = ip.octets();
    Ipv4Addr::new(a, b, c, 255)
}

/// Broadcast destinations for the given local addresses.
///
/// One /24 directed broadcast per address, followed by the limited
/// broadcast `255.255.255.255`. No duplicates.
#[must_use]
pub fn broadcast_addresses(local: &[Ipv4Addr]) -> Vec<Ipv4Addr> {
    let mut targets: Vec<Ipv4Addr> = Vec::with_capacity(local.len() + 1);
    for ip in local {
        let broadcast = directed_broadcast(*ip);
        if !targets.contains(&broadcast) {
            targets.push(broadcast);
        }
    }
    if !targets.contains(&Ipv4Addr::BROADCAST) {
        targets.push(Ipv4Addr::BROADCAST);
    }
    targets
}

/// Configure TCP keep-alive on a transfer connection.
///
/// A silently dead peer is then detected by the OS instead of hanging the
/// transfer until the I/O timeout fires.
pub fn configure_tcp_keepalive(stream: &TcpStream) -> Result<()> {
    let socket_ref = SockRef::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(10))
        .with_interval(Duration::from_secs(5));

    socket_ref
        .set_tcp_keepalive(&keepalive)
        .map_err(Error::Io)?;

    tracing::debug!("TCP keep-alive enabled on socket");
    Ok(())
}
