//! Error types for p2pshare.
//!
//! Discovery, framing and transfer faults share one error type so the
//! session coordinator can classify them without string matching.

use std::io;

use thiserror::Error;

/// A specialized `Result` type for p2pshare operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for p2pshare.
#[derive(Error, Debug)]
pub enum Error {
    /// The discovery or transfer endpoint could not be bound (E001)
    #[error("cannot bind port {port}: {reason}")]
    BindFailure {
        /// Port that was requested
        port: u16,
        /// Underlying OS reason
        reason: String,
    },

    /// A datagram that is not one of the discovery tags
    #[error("invalid discovery message")]
    InvalidMessage,

    /// Could not connect to the peer (E002)
    #[error("cannot connect to peer: {0}")]
    DialFailure(String),

    /// The connection was reset or aborted by the other side (E003)
    #[error("connection reset by peer")]
    ConnectionReset,

    /// The stream ended before a complete frame or before end-of-stream (E004)
    #[error("transfer truncated: expected {expected} bytes, received {received}")]
    Truncated {
        /// Bytes the current frame promised
        expected: u64,
        /// Bytes actually read before the stream closed
        received: u64,
    },

    /// A send is already in progress (E005)
    #[error("a transfer is already in progress")]
    Busy,

    /// Operation was cancelled
    #[error("operation cancelled")]
    Cancelled,

    /// Operation timeout
    #[error("operation timed out after {0} seconds")]
    Timeout(u64),

    /// A frame declared a length above the limit
    #[error("frame of {0} bytes exceeds the maximum frame size")]
    FrameTooLarge(usize),

    /// Received bytes did not match the transfer header
    #[error("size mismatch: header announced {expected} bytes, received {received}")]
    SizeMismatch {
        /// Size announced by the sender
        expected: u64,
        /// Bytes actually written
        received: u64,
    },

    /// Invalid protocol message
    #[error("invalid protocol message: {0}")]
    ProtocolError(String),

    /// File not found
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Invalid path
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Invalid user input (addresses, ports)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// Invalid configuration value
    #[error("invalid configuration value for '{key}': {reason}")]
    InvalidConfig {
        /// Configuration key
        key: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns the error code associated with this error, if any.
    ///
    /// Error codes follow the pattern EXXX where XXX is a 3-digit number.
    #[must_use]
    pub const fn code(&self) -> Option<&'static str> {
        match self {
            Self::BindFailure { .. } => Some("E001"),
            Self::DialFailure(_) => Some("E002"),
            Self::ConnectionReset => Some("E003"),
            Self::Truncated { .. } => Some("E004"),
            Self::Busy => Some("E005"),
            Self::Timeout(_) => Some("E006"),
            _ => None,
        }
    }

    /// Returns whether this error is recoverable (can be retried).
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::DialFailure(_)
                | Self::ConnectionReset
                | Self::Truncated { .. }
                | Self::Busy
                | Self::Timeout(_)
        )
    }

    /// Returns a helpful suggestion for resolving the error, if applicable.
    #[must_use]
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::BindFailure { .. } => Some(
                "Another program may already use this port.\n\
                 Close it or pick a different port in the config file.",
            ),
            Self::DialFailure(_) => Some(
                "Make sure p2pshare is running on the other machine\n\
                 and that both sides use the same transfer port.",
            ),
            Self::Busy => Some("Wait for the current transfer to finish, or cancel it."),
            _ => None,
        }
    }

    /// Classify an I/O error raised on a connected socket.
    ///
    /// Resets, aborts and broken pipes become [`Error::ConnectionReset`];
    /// anything else stays an [`Error::Io`].
    #[must_use]
    pub fn from_socket_io(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => Self::ConnectionReset,
            _ => Self::Io(err),
        }
    }
}
