//! TUI application state.
//!
//! Everything here is plain data updated from key actions and the
//! coordinator's status feed, so it can be tested without a terminal.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use p2pshare_core::discovery::{Peer, PeerSnapshot};
use p2pshare_core::session::StatusEvent;
use p2pshare_core::transfer::{TransferOutcome, TransferRole, TransferSession};

/// Which list the user is looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Stage {
    /// Choosing a peer
    #[default]
    Peers,
    /// Choosing a file to send to the chosen peer
    Files,
}

/// How a status message is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusLevel {
    /// Neutral information
    Info,
    /// Something is in flight
    Progress,
    /// Finished well
    Success,
    /// Needs the user's attention
    Error,
}

/// Message shown in the status box.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    /// Text
    pub message: String,
    /// Severity
    pub level: StatusLevel,
}

/// A sendable file in the listed directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// File name
    pub name: String,
    /// Full path
    pub path: PathBuf,
    /// Size in bytes
    pub size: u64,
}

/// List the regular files of `dir`, sorted by name.
pub fn load_files(dir: &Path) -> std::io::Result<Vec<FileEntry>> {
    let mut files = Vec::new();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(metadata) = entry.metadata() else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        files.push(FileEntry {
            name: entry.file_name().to_string_lossy().to_string(),
            path: entry.path(),
            size: metadata.len(),
        });
    }

    files.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(files)
}

/// Complete TUI state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Current stage
    pub stage: Stage,
    /// Latest peer snapshot
    pub peers: PeerSnapshot,
    /// Highlighted peer row
    pub peer_index: usize,
    /// Peer chosen for sending
    pub target: Option<Peer>,
    /// Files offered for sending
    pub files: Vec<FileEntry>,
    /// Highlighted file row
    pub file_index: usize,
    /// Status box content
    pub status: StatusLine,
    /// Send in flight, if any
    pub active_send: Option<TransferSession>,
    /// Address accepting incoming files
    pub receiving_on: Option<SocketAddr>,
    /// Whether discovery could bind its port
    pub discovery_available: bool,
}

impl AppState {
    /// Initial state offering `files`.
    pub fn new(files: Vec<FileEntry>) -> Self {
        Self {
            stage: Stage::Peers,
            peers: PeerSnapshot::default(),
            peer_index: 0,
            target: None,
            files,
            file_index: 0,
            status: StatusLine {
                message: StatusEvent::PeerListChanged(PeerSnapshot::default()).message(),
                level: StatusLevel::Info,
            },
            active_send: None,
            receiving_on: None,
            discovery_available: true,
        }
    }

    /// Replace the status message.
    pub fn set_status(&mut self, message: impl Into<String>, level: StatusLevel) {
        self.status = StatusLine {
            message: message.into(),
            level,
        };
    }

    /// Move the highlight up in the current list.
    pub fn move_up(&mut self) {
        let index = self.index_mut();
        *index = index.saturating_sub(1);
    }

    /// Move the highlight down in the current list.
    pub fn move_down(&mut self) {
        let len = self.current_len();
        let index = self.index_mut();
        if *index + 1 < len {
            *index += 1;
        }
    }

    fn index_mut(&mut self) -> &mut usize {
        match self.stage {
            Stage::Peers => &mut self.peer_index,
            Stage::Files => &mut self.file_index,
        }
    }

    fn current_len(&self) -> usize {
        match self.stage {
            Stage::Peers => self.peers.len(),
            Stage::Files => self.files.len(),
        }
    }

    /// Highlighted peer.
    pub fn selected_peer(&self) -> Option<&Peer> {
        self.peers.peers.get(self.peer_index)
    }

    /// Highlighted file.
    pub fn selected_file(&self) -> Option<&FileEntry> {
        self.files.get(self.file_index)
    }

    /// Whether a send is connecting or streaming.
    pub fn is_sending(&self) -> bool {
        self.active_send.is_some()
    }

    /// Take the highlighted peer as target and switch to the file list.
    ///
    /// Returns `false` if no peer is highlighted.
    pub fn choose_peer(&mut self) -> bool {
        let Some(peer) = self.selected_peer().cloned() else {
            self.set_status(
                StatusEvent::PeerListChanged(self.peers.clone()).message(),
                StatusLevel::Info,
            );
            return false;
        };

        self.set_status(
            format!("Sending to {}: choose a file", peer.ip()),
            StatusLevel::Info,
        );
        self.target = Some(peer);
        self.stage = Stage::Files;
        self.file_index = self.file_index.min(self.files.len().saturating_sub(1));
        true
    }

    /// Return to the peer list.
    pub fn back(&mut self) {
        self.stage = Stage::Peers;
        self.target = None;
        self.set_status(
            StatusEvent::PeerListChanged(self.peers.clone()).message(),
            StatusLevel::Info,
        );
    }

    /// Replace the file list, keeping the highlight in range.
    pub fn set_files(&mut self, files: Vec<FileEntry>) {
        self.files = files;
        self.file_index = self.file_index.min(self.files.len().saturating_sub(1));
    }

    /// Fold one status event into the state.
    pub fn apply(&mut self, event: &StatusEvent) {
        match event {
            StatusEvent::PeerListChanged(snapshot) => {
                if snapshot.generation < self.peers.generation {
                    return;
                }
                self.peers = snapshot.clone();
                self.peer_index = self.peer_index.min(self.peers.len().saturating_sub(1));

                match (&self.target, self.stage) {
                    (Some(target), Stage::Files) if self.peers.get(target.addr).is_none() => {
                        self.set_status(
                            format!("{} stopped answering", target.ip()),
                            StatusLevel::Error,
                        );
                    }
                    (_, Stage::Peers) if !self.is_sending() => {
                        self.set_status(event.message(), StatusLevel::Info);
                    }
                    _ => {}
                }
            }
            StatusEvent::TransferProgress(session) => {
                if session.role == TransferRole::Sender {
                    self.active_send = Some(session.clone());
                }
                self.set_status(event.message(), StatusLevel::Progress);
            }
            StatusEvent::TransferFinished(session, outcome) => {
                if session.role == TransferRole::Sender {
                    self.active_send = None;
                }
                let level = match outcome {
                    TransferOutcome::Completed { .. } => StatusLevel::Success,
                    TransferOutcome::Failed(_) => StatusLevel::Error,
                };
                self.set_status(event.message(), level);
            }
            StatusEvent::DiscoveryFailed(_) => {
                self.discovery_available = false;
                self.set_status(event.message(), StatusLevel::Error);
            }
            StatusEvent::DiscoveryWarning(_) | StatusEvent::ReceiverFailed(_) => {
                self.set_status(event.message(), StatusLevel::Error);
            }
        }
    }

    /// Catch up after missed status events.
    ///
    /// `sending` is the coordinator's own view; a send that finished while
    /// its events were dropped is cleared here.
    pub fn resync(&mut self, snapshot: PeerSnapshot, sending: bool) {
        self.apply(&StatusEvent::PeerListChanged(snapshot));

        if !sending {
            if let Some(session) = self.active_send.take() {
                self.set_status(
                    format!("Send of {} finished", session.file_name),
                    StatusLevel::Info,
                );
            }
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}
