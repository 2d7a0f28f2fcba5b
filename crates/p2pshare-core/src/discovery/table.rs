//! The live peer set.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use super::{Peer, PeerSnapshot};

/// Peers keyed by source address, with a change counter.
///
/// Not synchronised: a single task owns it and publishes snapshots.
#[derive(Debug, Default)]
pub struct PeerTable {
    peers: HashMap<SocketAddr, Instant>,
    generation: u64,
}

impl PeerTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a peer.
    ///
    /// Returns `true` when the peer was not present before, i.e. the
    /// membership changed and the generation was bumped.
    pub fn upsert(&mut self, addr: SocketAddr, now: Instant) -> bool {
        let is_new = self.peers.insert(addr, now).is_none();
        if is_new {
            self.generation += 1;
        }
        is_new
    }

    /// Drop peers last seen more than `window` before `now`.
    ///
    /// Returns the number of evicted peers.
    pub fn evict_expired(&mut self, now: Instant, window: Duration) -> usize {
        let before = self.peers.len();
        self.peers
            .retain(|_, last_seen| now.saturating_duration_since(*last_seen) <= window);
        let evicted = before - self.peers.len();
        if evicted > 0 {
            self.generation += 1;
        }
        evicted
    }

    /// Remove every peer. Always bumps the generation.
    pub fn clear(&mut self) {
        self.peers.clear();
        self.generation += 1;
    }

    /// Number of peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Copy of the table, sorted by address.
    #[must_use]
    pub fn snapshot(&self) -> PeerSnapshot {
        let mut peers: Vec<Peer> = self
            .peers
            .iter()
            .map(|(addr, last_seen)| Peer {
                addr: *addr,
                last_seen: *last_seen,
            })
            .collect();
        peers.sort_by_key(|p| p.addr);

        PeerSnapshot {
            generation: self.generation,
            peers,
        }
    }
}
