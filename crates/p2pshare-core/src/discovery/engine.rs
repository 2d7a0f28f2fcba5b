//! Discovery engine: probe task, listener task and the handle tying them.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::protocol::{self, DiscoveryMessage};

use super::{
    DiscoveryConfig, DiscoveryEvent, Peer, PeerSnapshot, PeerTable, RECV_BUFFER_SIZE,
};

/// Pause after a failed `recv_from` so a persistent error cannot spin.
const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(50);

/// Discovery events buffered for [`DiscoveryHandle::take_events`]; newer
/// events are dropped while the buffer is full.
pub const DISCOVERY_EVENT_CAPACITY: usize = 32;

/// Starts discovery sessions.
///
/// The engine itself holds only configuration; every [`start`](Self::start)
/// binds a fresh socket and returns an independent [`DiscoveryHandle`].
#[derive(Debug, Clone)]
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
}

impl DiscoveryEngine {
    /// Create an engine with the given settings.
    #[must_use]
    pub fn new(config: DiscoveryConfig) -> Self {
        Self { config }
    }

    /// Engine settings.
    #[must_use]
    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Bind the discovery port and start probing, answering and collecting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BindFailure`] if the UDP port cannot be bound.
    /// Nothing is retried.
    pub async fn start(&self) -> Result<DiscoveryHandle> {
        let config = self.config.clone();
        let socket = bind_discovery_socket(config.port).map_err(|e| Error::BindFailure {
            port: config.port,
            reason: e.to_string(),
        })?;
        let local_addr = socket.local_addr()?;
        let socket = Arc::new(socket);

        let local_ips = crate::connection::local_ipv4_addresses();
        let targets = config.target.resolve(config.port, &local_ips);

        tracing::info!(
            "Discovery listening on {} (probing {} target(s) every {:?})",
            local_addr,
            targets.len(),
            config.probe_interval
        );

        let (snapshot_tx, snapshot_rx) = watch::channel(PeerSnapshot::default());
        let (event_tx, event_rx) = mpsc::channel(DISCOVERY_EVENT_CAPACITY);
        let cancel = CancellationToken::new();

        let prober = tokio::spawn(probe_loop(
            Arc::clone(&socket),
            targets,
            config.probe_interval,
            event_tx.clone(),
            cancel.clone(),
        ));

        let listener = Listener {
            socket,
            own_port: local_addr.port(),
            local_ips,
            liveness_window: config.liveness_window,
            table: PeerTable::new(),
            snapshot_tx,
            event_tx,
        };
        let listener = tokio::spawn(listener.run(config.sweep_interval, cancel.clone()));

        Ok(DiscoveryHandle {
            local_addr,
            snapshots: snapshot_rx,
            events: Some(event_rx),
            cancel,
            tasks: vec![prober, listener],
        })
    }
}

/// A running discovery session.
///
/// Dropping the handle cancels both tasks; [`stop`](Self::stop) also waits
/// for them so the port is free when it returns.
#[derive(Debug)]
pub struct DiscoveryHandle {
    local_addr: SocketAddr,
    snapshots: watch::Receiver<PeerSnapshot>,
    events: Option<mpsc::Receiver<DiscoveryEvent>>,
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl DiscoveryHandle {
    /// Address the discovery socket is bound to.
    #[must_use]
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Latest consistent copy of the peer set.
    #[must_use]
    pub fn snapshot(&self) -> PeerSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Receiver notified on every membership change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PeerSnapshot> {
        self.snapshots.clone()
    }

    /// Lazy stream of snapshots, starting with the current one.
    #[must_use]
    pub fn snapshots(&self) -> WatchStream<PeerSnapshot> {
        WatchStream::new(self.snapshots.clone())
    }

    /// Take the receiver of non-fatal discovery events.
    ///
    /// Returns `None` after the first call. Events that arrive while the
    /// receiver is full, or was never taken, are dropped.
    pub fn take_events(&mut self) -> Option<mpsc::Receiver<DiscoveryEvent>> {
        self.events.take()
    }

    /// Whether the session has been stopped.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop probing and listening, release the socket and publish an
    /// empty peer set.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            if let Err(e) = task.await {
                tracing::warn!("Discovery task ended abnormally: {}", e);
            }
        }
        tracing::info!("Discovery on {} stopped", self.local_addr);
    }
}

impl Drop for DiscoveryHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Run discovery for `duration` and return the peers seen.
///
/// # Errors
///
/// Returns [`Error::BindFailure`] if the discovery port is taken.
pub async fn scan(config: DiscoveryConfig, duration: Duration) -> Result<Vec<Peer>> {
    let handle = DiscoveryEngine::new(config).start().await?;
    tokio::time::sleep(duration).await;
    let snapshot = handle.snapshot();
    handle.stop().await;
    Ok(snapshot.peers)
}

fn bind_discovery_socket(port: u16) -> std::io::Result<UdpSocket> {
    let socket = socket2::Socket::new(
        socket2::Domain::IPV4,
        socket2::Type::DGRAM,
        Some(socket2::Protocol::UDP),
    )?;

    socket.set_broadcast(true)?;
    socket.set_reuse_address(true)?;

    #[cfg(target_os = "macos")]
    socket.set_reuse_port(true)?;

    let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
    socket.bind(&addr.into())?;

    socket.set_nonblocking(true)?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket)
}

async fn probe_loop(
    socket: Arc<UdpSocket>,
    targets: Vec<SocketAddr>,
    interval: Duration,
    events: mpsc::Sender<DiscoveryEvent>,
    cancel: CancellationToken,
) {
    loop {
        for target in &targets {
            if let Err(e) = socket.send_to(protocol::encode_probe(), target).await {
                tracing::warn!("Failed to send probe to {}: {}", target, e);
                report(
                    &events,
                    DiscoveryEvent::ProbeFailed {
                        target: *target,
                        reason: e.to_string(),
                    },
                );
            }
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {}
            () = cancel.cancelled() => {
                tracing::debug!("Probe task received shutdown signal");
                break;
            }
        }
    }
}

fn report(events: &mpsc::Sender<DiscoveryEvent>, event: DiscoveryEvent) {
    if let Err(mpsc::error::TrySendError::Full(event)) = events.try_send(event) {
        tracing::debug!("Dropping discovery event, nobody is reading: {}", event);
    }
}

struct Listener {
    socket: Arc<UdpSocket>,
    own_port: u16,
    local_ips: Vec<Ipv4Addr>,
    liveness_window: Duration,
    table: PeerTable,
    snapshot_tx: watch::Sender<PeerSnapshot>,
    event_tx: mpsc::Sender<DiscoveryEvent>,
}

impl Listener {
    async fn run(mut self, sweep_interval: Duration, cancel: CancellationToken) {
        let mut sweep = tokio::time::interval(sweep_interval);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut buf = [0u8; RECV_BUFFER_SIZE];

        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = sweep.tick() => self.sweep(),
                result = self.socket.recv_from(&mut buf) => match result {
                    Ok((len, source)) => self.handle_datagram(&buf[..len], source).await,
                    Err(e) => {
                        tracing::warn!("Error receiving discovery datagram: {}", e);
                        report(&self.event_tx, DiscoveryEvent::ReceiveFailed(e.to_string()));
                        tokio::time::sleep(RECV_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        self.table.clear();
        self.snapshot_tx.send_replace(self.table.snapshot());
        tracing::debug!("Discovery listener exited");
    }

    async fn handle_datagram(&mut self, data: &[u8], source: SocketAddr) {
        let Ok(message) = protocol::decode(data) else {
            tracing::debug!(
                "Ignoring {} byte non-discovery datagram from {}",
                data.len(),
                source
            );
            return;
        };

        if self.is_self(source) {
            return;
        }

        match message {
            DiscoveryMessage::Probe => {
                tracing::debug!("Probe from {}", source);
                if let Err(e) = self
                    .socket
                    .send_to(protocol::encode_response(), source)
                    .await
                {
                    tracing::warn!("Failed to answer probe from {}: {}", source, e);
                }
            }
            DiscoveryMessage::Response => self.record(source, Instant::now()),
        }
    }

    fn record(&mut self, source: SocketAddr, now: Instant) {
        if self.table.upsert(source, now) {
            tracing::info!("Discovered peer {}", source);
            self.snapshot_tx.send_replace(self.table.snapshot());
        } else {
            // refresh last_seen without waking subscribers
            self.snapshot_tx.send_if_modified(|snapshot| {
                if let Some(peer) = snapshot.peers.iter_mut().find(|p| p.addr == source) {
                    peer.last_seen = now;
                }
                false
            });
        }
    }

    fn sweep(&mut self) {
        let evicted = self
            .table
            .evict_expired(Instant::now(), self.liveness_window);
        if evicted > 0 {
            tracing::info!("{} peer(s) expired", evicted);
            self.snapshot_tx.send_replace(self.table.snapshot());
        }
    }

    fn is_self(&self, source: SocketAddr) -> bool {
        if source.port() != self.own_port {
            return false;
        }
        match source.ip() {
            IpAddr::V4(ip) => ip.is_loopback() || ip.is_unspecified() || self.local_ips.contains(&ip),
            IpAddr::V6(ip) => ip.is_loopback(),
        }
    }
}
