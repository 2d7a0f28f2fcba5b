//! Session coordinator.
//!
//! [`Coordinator`] is the single entry point for the presentation layer.
//! It owns the discovery and transfer engines, keeps at most one
//! discovery session and one receive listener alive, and turns everything
//! the engines report into [`StatusEvent`]s on a broadcast feed.
//!
//! ```text
//!  DiscoveryHandle ──watch──► snapshot forwarder ──┐
//!  DiscoveryEvent  ──mpsc───► warning forwarder ───┤
//!  TransferEvent   ──mpsc───► transfer forwarder ──┼──► broadcast<StatusEvent>
//!  start/stop errors ──────────────────────────────┘
//! ```

mod status;

pub use status::StatusEvent;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::Config;
use crate::discovery::{
    DiscoveryConfig, DiscoveryEngine, DiscoveryEvent, DiscoveryHandle, Peer, PeerSnapshot,
};
use crate::error::Result;
use crate::file::DestinationPolicy;
use crate::transfer::{TransferConfig, TransferEngine, TransferEvent};

/// Capacity of the status broadcast channel.
const STATUS_CHANNEL_CAPACITY: usize = 256;

/// Peer snapshots as seen by the presentation layer.
///
/// Engine generations restart at zero with every discovery session; this
/// feed renumbers them so consumers see one increasing sequence.
#[derive(Debug)]
struct PeerFeed {
    snapshots: watch::Sender<PeerSnapshot>,
    generation: AtomicU64,
    status: broadcast::Sender<StatusEvent>,
}

impl PeerFeed {
    fn publish(&self, mut snapshot: PeerSnapshot) {
        snapshot.generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.snapshots.send_replace(snapshot.clone());
        let _ = self.status.send(StatusEvent::PeerListChanged(snapshot));
    }
}

struct DiscoveryRun {
    handle: DiscoveryHandle,
    forwarders: Vec<JoinHandle<()>>,
}

struct ReceiverRun {
    addr: SocketAddr,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Facade over discovery and transfer.
///
/// Must be created inside a Tokio runtime.
pub struct Coordinator {
    config: Config,
    discovery: DiscoveryEngine,
    transfer: TransferEngine,
    peers: Arc<PeerFeed>,
    status: broadcast::Sender<StatusEvent>,
    transfer_events: mpsc::UnboundedSender<TransferEvent>,
    transfer_forwarder: JoinHandle<()>,
    discovery_run: Mutex<Option<DiscoveryRun>>,
    receiver_run: Mutex<Option<ReceiverRun>>,
    send_cancel: Mutex<Option<CancellationToken>>,
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("discovery", self.discovery.config())
            .field("transfer", self.transfer.config())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Create a coordinator from the user configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let discovery = DiscoveryConfig::from_config(&config);
        let transfer = TransferConfig::from_config(&config);
        Self::from_parts(config, discovery, transfer)
    }

    /// Create a coordinator with explicit engine settings.
    #[must_use]
    pub fn from_parts(config: Config, discovery: DiscoveryConfig, transfer: TransferConfig) -> Self {
        let (status, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let (snapshots, _) = watch::channel(PeerSnapshot::default());
        let peers = Arc::new(PeerFeed {
            snapshots,
            generation: AtomicU64::new(0),
            status: status.clone(),
        });

        let (transfer_events, transfer_rx) = mpsc::unbounded_channel();
        let transfer_forwarder = tokio::spawn(forward_transfer_events(transfer_rx, status.clone()));

        Self {
            config,
            discovery: DiscoveryEngine::new(discovery),
            transfer: TransferEngine::new(transfer),
            peers,
            status,
            transfer_events,
            transfer_forwarder,
            discovery_run: Mutex::new(None),
            receiver_run: Mutex::new(None),
            send_cancel: Mutex::new(None),
        }
    }

    /// Configuration the coordinator was built from.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Subscribe to the status feed.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.status.subscribe()
    }

    /// Latest peer snapshot.
    #[must_use]
    pub fn peer_snapshot(&self) -> PeerSnapshot {
        self.peers.snapshots.borrow().clone()
    }

    /// Watch peer snapshots directly.
    #[must_use]
    pub fn watch_peers(&self) -> watch::Receiver<PeerSnapshot> {
        self.peers.snapshots.subscribe()
    }

    /// Start discovery. Calling it while discovery runs is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BindFailure`] if the discovery port is taken;
    /// a [`StatusEvent::DiscoveryFailed`] is emitted as well.
    pub async fn start_discovery(&self) -> Result<()> {
        let mut run = self.discovery_run.lock().await;
        if run.is_some() {
            return Ok(());
        }

        let mut handle = match self.discovery.start().await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!("Discovery failed to start: {}", e);
                let _ = self.status.send(StatusEvent::DiscoveryFailed(e.to_string()));
                return Err(e);
            }
        };

        let mut forwarders = vec![tokio::spawn(forward_snapshots(
            handle.subscribe(),
            Arc::clone(&self.peers),
        ))];
        if let Some(events) = handle.take_events() {
            forwarders.push(tokio::spawn(forward_discovery_events(
                events,
                self.status.clone(),
            )));
        }

        *run = Some(DiscoveryRun { handle, forwarders });
        Ok(())
    }

    /// Stop discovery and clear the peer list.
    pub async fn stop_discovery(&self) {
        let Some(run) = self.discovery_run.lock().await.take() else {
            return;
        };

        run.handle.stop().await;
        for task in run.forwarders {
            let _ = task.await;
        }
    }

    /// Whether discovery is running.
    pub async fn is_discovering(&self) -> bool {
        self.discovery_run.lock().await.is_some()
    }

    /// Send a file to a discovered peer on the configured transfer port.
    ///
    /// # Errors
    ///
    /// See [`send_file_to`](Self::send_file_to).
    pub async fn send_file(&self, path: impl AsRef<Path>, peer: &Peer) -> Result<Uuid> {
        let addr = peer.data_addr(self.config.network.transfer_port);
        self.send_file_to(path, addr).await
    }

    /// Send a file to an explicit transfer address.
    ///
    /// Returns as soon as the send has started; progress and the final
    /// outcome arrive on the status feed.
    ///
    /// # Errors
    ///
    /// - [`crate::Error::Busy`] while another send is connecting or streaming
    /// - [`crate::Error::FileNotFound`] / [`crate::Error::InvalidPath`] for
    ///   a bad source path
    pub async fn send_file_to(&self, path: impl AsRef<Path>, addr: SocketAddr) -> Result<Uuid> {
        let session = self.transfer.begin_send(path.as_ref(), addr)?;
        let id = session.id();
        let cancel = CancellationToken::new();
        *self.send_cancel.lock().await = Some(cancel.clone());

        let events = self.transfer_events.clone();
        tokio::spawn(async move {
            session.run(events, cancel).await;
        });

        Ok(id)
    }

    /// Whether a send is in flight.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.transfer.is_sending()
    }

    /// Cancel the active send, if any. Returns whether one was cancelled.
    pub async fn cancel_send(&self) -> bool {
        let token = self.send_cancel.lock().await.take();
        match token {
            Some(token) if self.transfer.is_sending() => {
                token.cancel();
                true
            }
            _ => false,
        }
    }

    /// Start accepting transfers on the configured port.
    ///
    /// Returns the bound address. Calling it while the listener runs
    /// returns the existing address.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::BindFailure`] if the port is taken; a
    /// [`StatusEvent::ReceiverFailed`] is emitted as well.
    pub async fn start_receiving(&self, policy: Arc<dyn DestinationPolicy>) -> Result<SocketAddr> {
        let mut run = self.receiver_run.lock().await;
        if let Some(existing) = run.as_ref() {
            return Ok(existing.addr);
        }

        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.config.network.transfer_port));
        let listener = match self.transfer.listen(bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                let _ = self.status.send(StatusEvent::ReceiverFailed(e.to_string()));
                return Err(e);
            }
        };
        let addr = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(listener.serve(
            policy,
            self.transfer_events.clone(),
            cancel.clone(),
        ));

        *run = Some(ReceiverRun { addr, cancel, task });
        Ok(addr)
    }

    /// Stop accepting; in-flight receives end as cancelled.
    pub async fn stop_receiving(&self) {
        let Some(run) = self.receiver_run.lock().await.take() else {
            return;
        };
        run.cancel.cancel();
        let _ = run.task.await;
    }

    /// Address of the receive listener, if running.
    pub async fn receiving_addr(&self) -> Option<SocketAddr> {
        self.receiver_run.lock().await.as_ref().map(|r| r.addr)
    }

    /// Stop everything.
    pub async fn shutdown(&self) {
        self.cancel_send().await;
        self.stop_discovery().await;
        self.stop_receiving().await;
        tracing::debug!("Coordinator shut down");
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.transfer_forwarder.abort();
        if let Some(run) = self.receiver_run.get_mut().take() {
            run.cancel.cancel();
        }
        if let Some(token) = self.send_cancel.get_mut().take() {
            token.cancel();
        }
    }
}

async fn forward_snapshots(mut updates: watch::Receiver<PeerSnapshot>, feed: Arc<PeerFeed>) {
    let initial = updates.borrow_and_update().clone();
    let mut last_generation = initial.generation;
    // the listener may have recorded peers before this task first ran
    if initial.generation > 0 {
        feed.publish(initial);
    }
    while updates.changed().await.is_ok() {
        let snapshot = updates.borrow_and_update().clone();
        if snapshot.generation <= last_generation {
            continue;
        }
        last_generation = snapshot.generation;
        feed.publish(snapshot);
    }
}

async fn forward_discovery_events(
    mut events: mpsc::Receiver<DiscoveryEvent>,
    status: broadcast::Sender<StatusEvent>,
) {
    while let Some(event) = events.recv().await {
        let _ = status.send(StatusEvent::DiscoveryWarning(event.to_string()));
    }
}

async fn forward_transfer_events(
    mut events: mpsc::UnboundedReceiver<TransferEvent>,
    status: broadcast::Sender<StatusEvent>,
) {
    while let Some(event) = events.recv().await {
        let status_event = match event {
            TransferEvent::Progress(session) => StatusEvent::TransferProgress(session),
            TransferEvent::Finished(session, outcome) => {
                StatusEvent::TransferFinished(session, outcome)
            }
            TransferEvent::ListenerError(reason) => StatusEvent::ReceiverFailed(reason),
        };
        let _ = status.send(status_event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::BroadcastTarget;
    use crate::Error;
    use std::time::Duration;

    fn loopback_parts(port: u16) -> (Config, DiscoveryConfig, TransferConfig) {
        let discovery = DiscoveryConfig {
            port,
            target: BroadcastTarget::Addrs(vec![SocketAddr::from(([127, 0, 0, 1], 9))]),
            probe_interval: Duration::from_millis(100),
            liveness_window: Duration::from_millis(200),
            sweep_interval: Duration::from_millis(50),
        };
        (Config::default(), discovery, TransferConfig::default())
    }

    #[tokio::test]
    async fn test_discovery_bind_failure_emits_status() {
        let blocker = std::net::UdpSocket::bind("0.0.0.0:0").unwrap();
        let port = blocker.local_addr().unwrap().port();

        let (config, discovery, transfer) = loopback_parts(port);
        let coordinator = Coordinator::from_parts(config, discovery, transfer);
        let mut status = coordinator.subscribe();

        let err = coordinator.start_discovery().await.unwrap_err();
        assert!(matches!(err, Error::BindFailure { .. }));
        assert!(matches!(
            status.try_recv(),
            Ok(StatusEvent::DiscoveryFailed(_))
        ));
        assert!(!coordinator.is_discovering().await);
    }

    #[tokio::test]
    async fn test_start_discovery_is_idempotent() {
        let (config, discovery, transfer) = loopback_parts(0);
        let coordinator = Coordinator::from_parts(config, discovery, transfer);

        coordinator.start_discovery().await.unwrap();
        coordinator.start_discovery().await.unwrap();
        assert!(coordinator.is_discovering().await);

        coordinator.stop_discovery().await;
        assert!(!coordinator.is_discovering().await);
        assert!(coordinator.peer_snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_send_missing_file_is_rejected() {
        let (config, discovery, transfer) = loopback_parts(0);
        let coordinator = Coordinator::from_parts(config, discovery, transfer);

        let err = coordinator
            .send_file_to("/definitely/not/here.bin", "127.0.0.1:9".parse().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
        assert!(!coordinator.is_sending());
        assert!(!coordinator.cancel_send().await);
    }

    #[tokio::test]
    async fn test_refused_send_reports_failure() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("note.txt");
        std::fs::write(&file, b"hi").unwrap();

        let (config, discovery, transfer) = loopback_parts(0);
        let coordinator = Coordinator::from_parts(config, discovery, transfer);
        let mut status = coordinator.subscribe();

        coordinator.send_file_to(&file, addr).await.unwrap();

        let message = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(event @ StatusEvent::TransferFinished(..)) = status.recv().await {
                    return event.message();
                }
            }
        })
        .await
        .expect("finished in time");

        assert_eq!(message, "Send failed: connection refused");
        assert!(!coordinator.is_sending());
    }

    fn peer_feed() -> (Arc<PeerFeed>, broadcast::Receiver<StatusEvent>) {
        let (status, status_rx) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let (snapshots, _) = watch::channel(PeerSnapshot::default());
        let feed = Arc::new(PeerFeed {
            snapshots,
            generation: AtomicU64::new(0),
            status,
        });
        (feed, status_rx)
    }

    #[tokio::test]
    async fn test_peers_recorded_before_forwarding_are_published() {
        let peer = Peer {
            addr: "192.168.1.7:9876".parse().unwrap(),
            last_seen: std::time::Instant::now(),
        };
        let (engine_tx, engine_rx) = watch::channel(PeerSnapshot {
            generation: 1,
            peers: vec![peer.clone()],
        });
        let (feed, mut status_rx) = peer_feed();

        let forwarder = tokio::spawn(forward_snapshots(engine_rx, Arc::clone(&feed)));
        drop(engine_tx);
        forwarder.await.unwrap();

        let published = feed.snapshots.borrow().clone();
        assert_eq!(published.peers, vec![peer]);
        assert_eq!(published.generation, 1);
        assert!(matches!(
            status_rx.try_recv(),
            Ok(StatusEvent::PeerListChanged(snapshot)) if snapshot.len() == 1
        ));
    }

    #[tokio::test]
    async fn test_empty_initial_snapshot_is_not_published() {
        let (engine_tx, engine_rx) = watch::channel(PeerSnapshot::default());
        let (feed, mut status_rx) = peer_feed();

        let forwarder = tokio::spawn(forward_snapshots(engine_rx, Arc::clone(&feed)));
        drop(engine_tx);
        forwarder.await.unwrap();

        assert_eq!(feed.snapshots.borrow().generation, 0);
        assert!(status_rx.try_recv().is_err());
    }
}
