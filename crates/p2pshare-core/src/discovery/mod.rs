//! Network discovery for p2pshare.
//!
//! Peers find each other with bare UDP datagrams on a well-known port:
//!
//! 1. Every probe interval an instance broadcasts `DISCOVER_PEER`
//! 2. Every instance that hears a probe unicasts `PEER_RESPONSE` back
//! 3. The prober records each responder; responders that stay silent for
//!    longer than the liveness window are evicted
//!
//! ## Protocol
//!
//! - Port: 9876 (UDP), configurable
//! - Probe interval: 1 second by default
//! - Liveness window: 2 probe intervals by default
//!
//! The peer table is owned by the listener task; readers get
//! [`PeerSnapshot`] copies through a `watch` channel.

mod engine;
mod table;

pub use engine::{scan, DiscoveryEngine, DiscoveryHandle, DISCOVERY_EVENT_CAPACITY};
pub use table::PeerTable;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{Duration, Instant};

use crate::config::Config;

/// Default discovery port.
pub const DEFAULT_DISCOVERY_PORT: u16 = crate::DEFAULT_DISCOVERY_PORT;

/// Largest datagram we read; discovery tags are far smaller.
pub(crate) const RECV_BUFFER_SIZE: usize = 1024;

/// A live instance seen on the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Peer {
    /// Source address of its responses (identity)
    pub addr: SocketAddr,
    /// When it last answered a probe
    pub last_seen: Instant,
}

impl Peer {
    /// Transfer address of this peer: same host, given data port.
    #[must_use]
    pub fn data_addr(&self, data_port: u16) -> SocketAddr {
        SocketAddr::new(self.addr.ip(), data_port)
    }

    /// Host part of the peer address.
    #[must_use]
    pub fn ip(&self) -> IpAddr {
        self.addr.ip()
    }
}

/// Point-in-time copy of the peer table.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSnapshot {
    /// Increases with every membership change
    pub generation: u64,
    /// Live peers, sorted by address
    pub peers: Vec<Peer>,
}

impl PeerSnapshot {
    /// Whether no peer is currently known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Number of known peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Look up a peer by address.
    #[must_use]
    pub fn get(&self, addr: SocketAddr) -> Option<&Peer> {
        self.peers.iter().find(|p| p.addr == addr)
    }

    /// Whether a peer with this host IP is present (any source port).
    #[must_use]
    pub fn contains_ip(&self, ip: IpAddr) -> bool {
        self.peers.iter().any(|p| p.addr.ip() == ip)
    }
}

/// Where probes are sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastTarget {
    /// /24 directed broadcast of each local interface plus 255.255.255.255
    Auto,
    /// Exactly these destinations
    Addrs(Vec<SocketAddr>),
}

impl BroadcastTarget {
    /// Resolve to concrete destinations on `port`.
    #[must_use]
    pub fn resolve(&self, port: u16, local: &[Ipv4Addr]) -> Vec<SocketAddr> {
        match self {
            Self::Auto => crate::connection::broadcast_addresses(local)
                .into_iter()
                .map(|ip| SocketAddr::new(IpAddr::V4(ip), port))
                .collect(),
            Self::Addrs(addrs) => addrs.clone(),
        }
    }
}

/// Non-fatal conditions reported while discovery runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryEvent {
    /// A probe could not be sent; listening continues
    ProbeFailed {
        /// Destination of the failed probe
        target: SocketAddr,
        /// OS error text
        reason: String,
    },
    /// Receiving a datagram failed; the listener keeps going
    ReceiveFailed(String),
}

impl std::fmt::Display for DiscoveryEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProbeFailed { target, reason } => {
                write!(f, "probe to {target} failed: {reason}")
            }
            Self::ReceiveFailed(reason) => write!(f, "discovery receive failed: {reason}"),
        }
    }
}

/// Runtime settings for a discovery engine.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// UDP port to bind and answer on
    pub port: u16,
    /// Probe destinations
    pub target: BroadcastTarget,
    /// Interval between probes
    pub probe_interval: Duration,
    /// Peers silent for longer than this are evicted
    pub liveness_window: Duration,
    /// How often the eviction sweep runs
    pub sweep_interval: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        let probe_interval = Duration::from_secs(1);
        Self {
            port: DEFAULT_DISCOVERY_PORT,
            target: BroadcastTarget::Auto,
            probe_interval,
            liveness_window: probe_interval * 2,
            sweep_interval: probe_interval / 2,
        }
    }
}

impl DiscoveryConfig {
    /// Build engine settings from the user configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let port = config.network.discovery_port;
        let target = config
            .network
            .broadcast_address
            .map_or(BroadcastTarget::Auto, |ip| {
                BroadcastTarget::Addrs(vec![SocketAddr::new(IpAddr::V4(ip), port)])
            });

        Self {
            port,
            target,
            probe_interval: config.discovery.probe_interval,
            liveness_window: config.discovery.liveness_window,
            sweep_interval: config.discovery.sweep_interval,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_addr_keeps_host() {
        let peer = Peer {
            addr: "192.168.1.100:9876".parse().unwrap(),
            last_seen: Instant::now(),
        };
        assert_eq!(
            peer.data_addr(9000),
            "192.168.1.100:9000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_default_window_is_two_intervals() {
        let config = DiscoveryConfig::default();
        assert_eq!(config.liveness_window, config.probe_interval * 2);
        assert_eq!(config.port, 9876);
    }

    #[test]
    fn test_resolve_auto_targets() {
        let local = [Ipv4Addr::new(192, 168, 0, 7)];
        let targets = BroadcastTarget::Auto.resolve(9876, &local);
        assert_eq!(
            targets,
            vec![
                "192.168.0.255:9876".parse::<SocketAddr>().unwrap(),
                "255.255.255.255:9876".parse::<SocketAddr>().unwrap(),
            ]
        );
    }

    #[test]
    fn test_from_config_fixed_broadcast() {
        let mut config = Config::default();
        config.network.discovery_port = 9999;
        config.network.broadcast_address = Some(Ipv4Addr::new(10, 1, 2, 255));

        let discovery = DiscoveryConfig::from_config(&config);
        assert_eq!(discovery.port, 9999);
        assert_eq!(
            discovery.target,
            BroadcastTarget::Addrs(vec!["10.1.2.255:9999".parse().unwrap()])
        );
    }

    #[test]
    fn test_snapshot_lookup() {
        let addr: SocketAddr = "10.0.0.2:9876".parse().unwrap();
        let snapshot = PeerSnapshot {
            generation: 3,
            peers: vec![Peer {
                addr,
                last_seen: Instant::now(),
            }],
        };
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.get(addr).is_some());
        assert!(snapshot.contains_ip(addr.ip()));
        assert!(!PeerSnapshot::default().contains_ip(addr.ip()));
    }
}
