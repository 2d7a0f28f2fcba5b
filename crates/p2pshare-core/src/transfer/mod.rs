//! File transfer engine for p2pshare.
//!
//! One file per TCP connection, framed by [`crate::protocol`]:
//!
//! ```text
//! Sender                                  Receiver
//!   |                                        |
//!   |──── connect ─────────────────────────►|  accept, spawn session
//!   |──── [len][TransferHeader JSON] ──────►|  pick destination, create file
//!   |──── [len][data] ... ─────────────────►|  append, report progress
//!   |──── [0] end-of-stream ───────────────►|  flush, sync, Completed
//!   |──── FIN ─────────────────────────────►|
//! ```
//!
//! A stream that ends without the end-of-stream frame is truncated; the
//! receiver keeps the partial file and reports `Failed(Truncated)`.
//!
//! At most one send runs at a time per engine. Receiving sessions are
//! independent of each other and of the sender.

mod receiver;
mod sender;

pub use receiver::{receive_into, TransferListener};
pub use sender::SendSession;

use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{Error, Result};

/// Default transfer port.
pub const DEFAULT_TRANSFER_PORT: u16 = crate::DEFAULT_TRANSFER_PORT;

/// Channel transfer sessions report on.
pub type TransferEvents = mpsc::UnboundedSender<TransferEvent>;

/// Which side of the connection a session is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRole {
    /// Reading a local file and dialling the peer
    Sender,
    /// Accepted a connection and writing to disk
    Receiver,
}

/// Transfer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Created, nothing on the wire yet
    Idle,
    /// Dialling (sender) or waiting for the header (receiver)
    Connecting,
    /// Data frames flowing
    Streaming,
    /// End-of-stream exchanged, file complete
    Completed,
    /// Ended without completing
    Failed,
}

impl TransferState {
    /// Whether the session is over.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Whether the session is on the wire.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Streaming)
    }
}

/// One transfer, as seen by progress observers.
#[derive(Debug, Clone)]
pub struct TransferSession {
    /// Unique session id
    pub id: Uuid,
    /// Sender or receiver
    pub role: TransferRole,
    /// Remote address
    pub peer: SocketAddr,
    /// File name on the wire
    pub file_name: String,
    /// Source file (sender) or destination (receiver, once chosen)
    pub local_path: Option<PathBuf>,
    /// Announced size, when known
    pub total_size: Option<u64>,
    /// Payload bytes moved so far
    pub bytes_transferred: u64,
    /// Current state
    pub state: TransferState,
    /// When the session was created
    pub started_at: DateTime<Utc>,
}

impl TransferSession {
    fn new(role: TransferRole, peer: SocketAddr) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            peer,
            file_name: String::new(),
            local_path: None,
            total_size: None,
            bytes_transferred: 0,
            state: TransferState::Idle,
            started_at: Utc::now(),
        }
    }

    /// Completion percentage, if the total size is known.
    #[must_use]
    pub fn percentage(&self) -> Option<f64> {
        match self.total_size {
            Some(0) => Some(100.0),
            Some(total) => Some(self.bytes_transferred as f64 / total as f64 * 100.0),
            None => None,
        }
    }

    /// Average throughput since the session started.
    #[must_use]
    pub fn bytes_per_second(&self) -> u64 {
        let elapsed = (Utc::now() - self.started_at).num_milliseconds();
        if elapsed <= 0 {
            return 0;
        }
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let rate = (self.bytes_transferred as f64 * 1000.0 / elapsed as f64) as u64;
        rate
    }
}

/// Why a transfer failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// Could not connect
    DialFailure(String),
    /// Reset or aborted by the other side
    ConnectionReset,
    /// Stream closed before the end-of-stream frame
    Truncated,
    /// Byte count differs from the header
    SizeMismatch {
        /// Announced by the sender
        expected: u64,
        /// Actually received
        received: u64,
    },
    /// A frame read or write exceeded the I/O timeout
    Timeout,
    /// Cancelled locally
    Cancelled,
    /// Local file or socket error
    Io(String),
    /// Peer sent something that is not a valid transfer
    Protocol(String),
}

impl FailureReason {
    /// Classify an error that ended a session.
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::DialFailure(reason) => Self::DialFailure(reason.clone()),
            Error::ConnectionReset => Self::ConnectionReset,
            Error::Truncated { .. } => Self::Truncated,
            Error::SizeMismatch { expected, received } => Self::SizeMismatch {
                expected: *expected,
                received: *received,
            },
            Error::Timeout(_) => Self::Timeout,
            Error::Cancelled => Self::Cancelled,
            Error::Io(_) | Error::FileNotFound(_) | Error::InvalidPath(_) => {
                Self::Io(err.to_string())
            }
            _ => Self::Protocol(err.to_string()),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DialFailure(reason) => write!(f, "{reason}"),
            Self::ConnectionReset => write!(f, "connection reset by peer"),
            Self::Truncated => write!(f, "transfer truncated"),
            Self::SizeMismatch { expected, received } => {
                write!(f, "size mismatch: expected {expected} bytes, got {received}")
            }
            Self::Timeout => write!(f, "timed out"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Io(reason) => write!(f, "{reason}"),
            Self::Protocol(reason) => write!(f, "protocol error: {reason}"),
        }
    }
}

/// Terminal result of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// All bytes delivered
    Completed {
        /// Payload bytes moved
        bytes: u64,
    },
    /// Ended early
    Failed(FailureReason),
}

impl TransferOutcome {
    /// Whether the transfer completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    fn from_result(result: &Result<u64>) -> Self {
        match result {
            Ok(bytes) => Self::Completed { bytes: *bytes },
            Err(e) => Self::Failed(FailureReason::from_error(e)),
        }
    }
}

/// What transfer sessions report.
#[derive(Debug, Clone)]
pub enum TransferEvent {
    /// State change or data progress
    Progress(TransferSession),
    /// The session reached a terminal state
    Finished(TransferSession, TransferOutcome),
    /// The accept loop hit an error; it keeps accepting
    ListenerError(String),
}

/// Runtime settings for transfers.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Payload bytes per data frame
    pub chunk_size: usize,
    /// Dial deadline
    pub connect_timeout: Duration,
    /// Per-frame read/write deadline
    pub io_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::DEFAULT_CHUNK_SIZE,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(30),
        }
    }
}

impl TransferConfig {
    /// Build engine settings from the user configuration.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            chunk_size: config.transfer.chunk_size,
            connect_timeout: config.transfer.connect_timeout,
            io_timeout: config.transfer.io_timeout,
        }
    }
}

/// Creates send sessions and receive listeners.
#[derive(Debug, Clone)]
pub struct TransferEngine {
    config: TransferConfig,
    send_active: Arc<AtomicBool>,
}

impl TransferEngine {
    /// Create an engine.
    #[must_use]
    pub fn new(config: TransferConfig) -> Self {
        Self {
            config,
            send_active: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Engine settings.
    #[must_use]
    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Whether a send session currently holds the send slot.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.send_active.load(Ordering::Acquire)
    }

    /// Prepare sending `path` to `peer`.
    ///
    /// Preconditions are checked here, before anything touches the network.
    /// The returned session holds the send slot until it is run to
    /// completion or dropped.
    ///
    /// # Errors
    ///
    /// - [`Error::Busy`] if another send is active
    /// - [`Error::FileNotFound`] / [`Error::InvalidPath`] if `path` is not a
    ///   regular file
    pub fn begin_send(&self, path: &Path, peer: SocketAddr) -> Result<SendSession> {
        let permit = SendPermit::acquire(&self.send_active).ok_or(Error::Busy)?;
        SendSession::prepare(path, peer, self.config.clone(), permit)
    }

    /// Bind the receiving side.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BindFailure`] if the TCP port cannot be bound.
    pub async fn listen(&self, addr: SocketAddr) -> Result<TransferListener> {
        TransferListener::bind(addr, self.config.clone()).await
    }
}

/// Holds the single send slot; released on drop.
#[derive(Debug)]
pub(crate) struct SendPermit {
    flag: Arc<AtomicBool>,
}

impl SendPermit {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for SendPermit {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_permit_is_exclusive() {
        let flag = Arc::new(AtomicBool::new(false));

        let first = SendPermit::acquire(&flag).expect("first permit");
        assert!(SendPermit::acquire(&flag).is_none());

        drop(first);
        assert!(SendPermit::acquire(&flag).is_some());
    }

    #[test]
    fn test_begin_send_busy_and_release() {
        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.bin");
        std::fs::write(&file, b"abc").unwrap();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();

        let engine = TransferEngine::new(TransferConfig::default());
        let session = engine.begin_send(&file, peer).expect("first send");
        assert!(engine.is_sending());
        assert!(matches!(engine.begin_send(&file, peer), Err(Error::Busy)));

        drop(session);
        assert!(!engine.is_sending());
        assert!(engine.begin_send(&file, peer).is_ok());
    }

    #[test]
    fn test_begin_send_rejects_bad_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let peer: SocketAddr = "127.0.0.1:9".parse().unwrap();
        let engine = TransferEngine::new(TransferConfig::default());

        assert!(matches!(
            engine.begin_send(dir.path(), peer),
            Err(Error::InvalidPath(_))
        ));
        assert!(matches!(
            engine.begin_send(&dir.path().join("nope"), peer),
            Err(Error::FileNotFound(_))
        ));
        assert!(!engine.is_sending(), "failed precondition must release the slot");
    }

    #[test]
    fn test_failure_reason_classification() {
        assert_eq!(
            FailureReason::from_error(&Error::Truncated {
                expected: 10,
                received: 3
            }),
            FailureReason::Truncated
        );
        assert_eq!(
            FailureReason::from_error(&Error::ConnectionReset),
            FailureReason::ConnectionReset
        );
        assert_eq!(
            FailureReason::from_error(&Error::Timeout(30)),
            FailureReason::Timeout
        );
        assert!(matches!(
            FailureReason::from_error(&Error::FrameTooLarge(1 << 30)),
            FailureReason::Protocol(_)
        ));
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(FailureReason::Truncated.to_string(), "transfer truncated");
        assert_eq!(
            FailureReason::DialFailure("connection refused".into()).to_string(),
            "connection refused"
        );
    }

    #[test]
    fn test_percentage() {
        let mut session =
            TransferSession::new(TransferRole::Sender, "127.0.0.1:9000".parse().unwrap());
        assert_eq!(session.percentage(), None);

        session.total_size = Some(200);
        session.bytes_transferred = 50;
        assert_eq!(session.percentage(), Some(25.0));

        session.total_size = Some(0);
        assert_eq!(session.percentage(), Some(100.0));
    }

    #[test]
    fn test_state_helpers() {
        assert!(TransferState::Streaming.is_active());
        assert!(!TransferState::Idle.is_active());
        assert!(TransferState::Failed.is_terminal());
        assert!(!TransferState::Connecting.is_terminal());
    }
}
