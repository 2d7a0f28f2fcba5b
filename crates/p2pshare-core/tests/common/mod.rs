//! Common test utilities for `p2pshare` integration tests.
//!
//! Every test binary runs in its own process, so ports are handed out
//! from a range derived from the process id.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::Duration;

use p2pshare_core::config::Config;
use p2pshare_core::discovery::{BroadcastTarget, DiscoveryConfig};
use p2pshare_core::session::{Coordinator, StatusEvent};
use p2pshare_core::transfer::{TransferConfig, TransferOutcome, TransferRole, TransferSession};
use tokio::sync::broadcast;

/// Ports handed out so far in this process.
static TEST_PORT_COUNTER: AtomicU16 = AtomicU16::new(0);

/// Get a port unlikely to clash with parallel tests or other test binaries.
pub fn next_port() -> u16 {
    let base = 30_000 + u16::try_from(std::process::id() % 500).unwrap_or(0) * 40;
    base + TEST_PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// Create a temporary directory for test files.
pub fn create_temp_dir() -> tempfile::TempDir {
    tempfile::tempdir().expect("Failed to create temp directory")
}

/// Create a test file with the given content.
pub fn create_test_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Generate random bytes for testing.
pub fn random_bytes(size: usize) -> Vec<u8> {
    use rand::RngCore;
    let mut bytes = vec![0u8; size];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes
}

/// Assert that two files have identical content.
pub fn assert_files_equal(path1: &Path, path2: &Path) {
    let content1 = std::fs::read(path1).expect("Failed to read first file");
    let content2 = std::fs::read(path2).expect("Failed to read second file");
    assert_eq!(content1.len(), content2.len(), "File sizes differ");
    assert!(content1 == content2, "File contents differ");
}

/// Fast discovery settings probing only `peer_port` on loopback.
pub fn loopback_discovery(port: u16, peer_port: u16) -> DiscoveryConfig {
    DiscoveryConfig {
        port,
        target: BroadcastTarget::Addrs(vec![SocketAddr::from(([127, 0, 0, 1], peer_port))]),
        probe_interval: Duration::from_millis(100),
        liveness_window: Duration::from_millis(300),
        sweep_interval: Duration::from_millis(50),
    }
}

/// Coordinator on loopback.
///
/// Discovery binds `discovery_port` and probes `peer_discovery_port`;
/// receiving binds `transfer_port`, which is also the port sends dial.
pub fn loopback_coordinator(
    discovery_port: u16,
    peer_discovery_port: u16,
    transfer_port: u16,
) -> Coordinator {
    let mut config = Config::default();
    config.network.discovery_port = discovery_port;
    config.network.transfer_port = transfer_port;

    Coordinator::from_parts(
        config,
        loopback_discovery(discovery_port, peer_discovery_port),
        TransferConfig::default(),
    )
}

/// Wait for the first finished transfer of `role`.
pub async fn wait_for_finished(
    status: &mut broadcast::Receiver<StatusEvent>,
    role: TransferRole,
    within: Duration,
) -> (TransferSession, TransferOutcome) {
    tokio::time::timeout(within, async {
        loop {
            match status.recv().await {
                Ok(StatusEvent::TransferFinished(session, outcome)) if session.role == role => {
                    return (session, outcome);
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("status feed closed"),
            }
        }
    })
    .await
    .expect("transfer did not finish in time")
}
