//! Sending side of a transfer.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::connection::configure_tcp_keepalive;
use crate::error::{Error, Result};
use crate::file::{offered_name, regular_file_size};
use crate::protocol::{self, TransferHeader};

use super::{
    SendPermit, TransferConfig, TransferEvent, TransferEvents, TransferOutcome, TransferRole,
    TransferSession, TransferState,
};

/// A prepared send, holding the engine's send slot.
#[derive(Debug)]
pub struct SendSession {
    session: TransferSession,
    path: PathBuf,
    config: TransferConfig,
    permit: SendPermit,
}

impl SendSession {
    pub(super) fn prepare(
        path: &Path,
        peer: SocketAddr,
        config: TransferConfig,
        permit: SendPermit,
    ) -> Result<Self> {
        let size = regular_file_size(path)?;
        let file_name = offered_name(path)?;

        let mut session = TransferSession::new(TransferRole::Sender, peer);
        session.file_name = file_name;
        session.total_size = Some(size);
        session.local_path = Some(path.to_path_buf());

        Ok(Self {
            session,
            path: path.to_path_buf(),
            config,
            permit,
        })
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.session.id
    }

    /// Current session view.
    #[must_use]
    pub fn session(&self) -> &TransferSession {
        &self.session
    }

    /// Dial the peer and stream the file.
    ///
    /// Reports every state change and data frame on `events`, then a
    /// single [`TransferEvent::Finished`]. The send slot is released
    /// before `Finished` is emitted.
    pub async fn run(mut self, events: TransferEvents, cancel: CancellationToken) -> TransferOutcome {
        tracing::info!(
            "Sending '{}' ({} bytes) to {}",
            self.session.file_name,
            self.session.total_size.unwrap_or_default(),
            self.session.peer
        );

        let result = tokio::select! {
            r = self.stream_file(&events) => r,
            () = cancel.cancelled() => Err(Error::Cancelled),
        };

        self.finish(&result, &events)
    }

    async fn stream_file(&mut self, events: &TransferEvents) -> Result<u64> {
        self.set_state(TransferState::Connecting, events);
        let mut stream = self.dial().await?;
        configure_tcp_keepalive(&stream)?;

        let io_timeout = self.config.io_timeout;
        let mut file = tokio::fs::File::open(&self.path).await?;

        let header = TransferHeader {
            file_name: self.session.file_name.clone(),
            size: self.session.total_size,
        };
        let header = protocol::encode_header(&header)?;
        protocol::write_frame_with_timeout(&mut stream, &header, io_timeout).await?;

        self.set_state(TransferState::Streaming, events);

        let mut buf = vec![0u8; self.config.chunk_size];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            protocol::write_frame_with_timeout(&mut stream, &buf[..n], io_timeout).await?;
            self.session.bytes_transferred += n as u64;
            let _ = events.send(TransferEvent::Progress(self.session.clone()));
        }

        protocol::write_frame_with_timeout(&mut stream, &[], io_timeout).await?;
        stream.shutdown().await.map_err(Error::from_socket_io)?;

        Ok(self.session.bytes_transferred)
    }

    async fn dial(&self) -> Result<TcpStream> {
        let peer = self.session.peer;
        let connect_timeout = self.config.connect_timeout;

        match timeout(connect_timeout, TcpStream::connect(peer)).await {
            Ok(Ok(stream)) => {
                tracing::debug!("Connected to {}", peer);
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::DialFailure(describe_dial_error(&e))),
            Err(_) => Err(Error::DialFailure(format!(
                "no answer from {peer} within {}s",
                connect_timeout.as_secs()
            ))),
        }
    }

    fn set_state(&mut self, state: TransferState, events: &TransferEvents) {
        self.session.state = state;
        let _ = events.send(TransferEvent::Progress(self.session.clone()));
    }

    fn finish(self, result: &Result<u64>, events: &TransferEvents) -> TransferOutcome {
        let Self {
            mut session,
            permit,
            ..
        } = self;
        drop(permit);

        let outcome = TransferOutcome::from_result(result);
        match result {
            Ok(bytes) => {
                session.state = TransferState::Completed;
                tracing::info!("Sent '{}' to {} ({} bytes)", session.file_name, session.peer, bytes);
            }
            Err(e) => {
                session.state = TransferState::Failed;
                tracing::error!("Send of '{}' to {} failed: {}", session.file_name, session.peer, e);
            }
        }

        let _ = events.send(TransferEvent::Finished(session, outcome.clone()));
        outcome
    }
}

fn describe_dial_error(err: &io::Error) -> String {
    match err.kind() {
        io::ErrorKind::ConnectionRefused => "connection refused".to_string(),
        io::ErrorKind::TimedOut => "connection timed out".to_string(),
        io::ErrorKind::HostUnreachable => "host unreachable".to_string(),
        io::ErrorKind::NetworkUnreachable => "network unreachable".to_string(),
        _ => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::{FailureReason, TransferEngine};
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_dial_refused() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"hello").unwrap();

        let engine = TransferEngine::new(TransferConfig::default());
        let session = engine.begin_send(&file, addr).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        let outcome = session.run(tx, CancellationToken::new()).await;
        assert_eq!(
            outcome,
            TransferOutcome::Failed(FailureReason::DialFailure("connection refused".into()))
        );
        assert!(!engine.is_sending());

        let mut saw_finished = false;
        while let Ok(event) = rx.try_recv() {
            if let TransferEvent::Finished(session, _) = event {
                assert_eq!(session.state, TransferState::Failed);
                saw_finished = true;
            }
        }
        assert!(saw_finished);
    }

    #[tokio::test]
    async fn test_cancelled_send_releases_slot() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let dir = tempfile::TempDir::new().unwrap();
        let file = dir.path().join("big.bin");
        std::fs::write(&file, vec![1u8; 4 * 1024 * 1024]).unwrap();

        let engine = TransferEngine::new(TransferConfig {
            chunk_size: 1024,
            ..TransferConfig::default()
        });
        let session = engine.begin_send(&file, addr).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = session.run(tx, cancel).await;
        assert_eq!(outcome, TransferOutcome::Failed(FailureReason::Cancelled));
        assert!(!engine.is_sending());
    }

    #[test]
    fn test_describe_dial_error() {
        let refused = io::Error::new(io::ErrorKind::ConnectionRefused, "os error 111");
        assert_eq!(describe_dial_error(&refused), "connection refused");
    }
}
