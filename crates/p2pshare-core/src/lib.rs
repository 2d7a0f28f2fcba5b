//! # p2pshare Core Library
//!
//! `p2pshare-core` finds other running instances of p2pshare on the local
//! network and moves a single file to one of them.
//!
//! ## Features
//!
//! - **Broadcast discovery**: UDP probes answered by every live peer
//! - **Framed transfers**: length-prefixed TCP frames with an explicit end-of-stream marker
//! - **One facade**: [`session::Coordinator`] drives discovery, sending and receiving
//!
//! ## Modules
//!
//! - [`config`] - Configuration management
//! - [`connection`] - Address parsing and local interface helpers
//! - [`discovery`] - Peer discovery via UDP broadcast
//! - [`mod@file`] - Destination naming and file helpers
//! - [`protocol`] - Discovery tags and transfer framing
//! - [`session`] - Session coordinator and status feed
//! - [`transfer`] - File transfer engine
//!
//! ## Example
//!
//! ```rust,ignore
//! use p2pshare_core::config::Config;
//! use p2pshare_core::session::Coordinator;
//!
//! let coordinator = Coordinator::new(Config::default());
//! coordinator.start_discovery().await?;
//!
//! let snapshot = coordinator.peer_snapshot();
//! if let Some(peer) = snapshot.peers.first() {
//!     coordinator.send_file("notes.txt", peer).await?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod connection;
pub mod discovery;
pub mod error;
pub mod file;
pub mod protocol;
pub mod session;
pub mod transfer;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default discovery port (UDP)
pub const DEFAULT_DISCOVERY_PORT: u16 = 9876;

/// Default transfer port (TCP)
pub const DEFAULT_TRANSFER_PORT: u16 = 9000;

/// Default chunk size for file transfers (64 KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;
