//! Receiving side of a transfer.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::connection::configure_tcp_keepalive;
use crate::error::{Error, Result};
use crate::file::{DestinationPolicy, FileWriter};
use crate::protocol::{self, Frame};

use super::{
    TransferConfig, TransferEvent, TransferEvents, TransferOutcome, TransferRole,
    TransferSession, TransferState,
};

/// Pause after a failed `accept` so a persistent error cannot spin.
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Bound TCP listener for incoming transfers.
#[derive(Debug)]
pub struct TransferListener {
    listener: TcpListener,
    config: TransferConfig,
}

impl TransferListener {
    pub(super) async fn bind(addr: SocketAddr, config: TransferConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::BindFailure {
                port: addr.port(),
                reason: e.to_string(),
            })?;

        tracing::info!("Accepting transfers on {}", listener.local_addr()?);
        Ok(Self { listener, config })
    }

    /// Address the listener is bound to.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS cannot report the address.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `cancel` fires.
    ///
    /// Each connection becomes an independent receiving session. Cancelling
    /// also cancels sessions still in flight.
    pub async fn serve(
        self,
        policy: Arc<dyn DestinationPolicy>,
        events: TransferEvents,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        tracing::debug!("Incoming transfer from {}", peer);
                        let policy = Arc::clone(&policy);
                        let events = events.clone();
                        let config = self.config.clone();
                        let session_cancel = cancel.child_token();
                        tokio::spawn(async move {
                            receive_into(stream, peer, policy.as_ref(), &config, &events, session_cancel)
                                .await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!("Failed to accept transfer connection: {}", e);
                        let _ = events.send(TransferEvent::ListenerError(e.to_string()));
                        tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                    }
                },
            }
        }

        tracing::info!("Transfer listener stopped");
    }
}

/// Receive one file from an accepted connection.
///
/// Reads the header, asks `policy` for a destination, writes every data
/// frame and finalises on end-of-stream. On any failure the partially
/// written file is left in place.
pub async fn receive_into(
    mut stream: TcpStream,
    peer: SocketAddr,
    policy: &dyn DestinationPolicy,
    config: &TransferConfig,
    events: &TransferEvents,
    cancel: CancellationToken,
) -> TransferOutcome {
    let mut session = TransferSession::new(TransferRole::Receiver, peer);
    session.state = TransferState::Connecting;
    let _ = events.send(TransferEvent::Progress(session.clone()));

    let result = tokio::select! {
        r = receive_stream(&mut stream, &mut session, policy, config, events) => r,
        () = cancel.cancelled() => Err(Error::Cancelled),
    };

    let outcome = TransferOutcome::from_result(&result);
    match &result {
        Ok(bytes) => {
            session.state = TransferState::Completed;
            tracing::info!(
                "Received '{}' from {} ({} bytes)",
                session.file_name,
                peer,
                bytes
            );
        }
        Err(e) => {
            session.state = TransferState::Failed;
            tracing::error!(
                "Receiving '{}' from {} failed after {} bytes: {}",
                session.file_name,
                peer,
                session.bytes_transferred,
                e
            );
        }
    }

    let _ = events.send(TransferEvent::Finished(session, outcome.clone()));
    outcome
}

async fn receive_stream(
    stream: &mut TcpStream,
    session: &mut TransferSession,
    policy: &dyn DestinationPolicy,
    config: &TransferConfig,
    events: &TransferEvents,
) -> Result<u64> {
    configure_tcp_keepalive(stream)?;
    let io_timeout = config.io_timeout;

    let header = match protocol::read_frame_with_timeout(stream, io_timeout).await? {
        Frame::Payload(bytes) => protocol::decode_header(&bytes)?,
        Frame::EndOfStream => {
            return Err(Error::ProtocolError(
                "stream ended before transfer header".to_string(),
            ))
        }
    };

    session.file_name.clone_from(&header.file_name);
    session.total_size = header.size;

    let mut writer = FileWriter::create(policy, &header, session.peer).await?;
    session.local_path = Some(writer.output_path.clone());
    session.state = TransferState::Streaming;
    let _ = events.send(TransferEvent::Progress(session.clone()));

    tracing::debug!(
        "Writing '{}' from {} to {}",
        header.file_name,
        session.peer,
        writer.output_path.display()
    );

    match copy_frames(stream, &mut writer, session, io_timeout, events).await {
        Ok(()) => writer.finalize().await,
        Err(e) => {
            writer.abandon().await;
            Err(e)
        }
    }
}

async fn copy_frames(
    stream: &mut TcpStream,
    writer: &mut FileWriter,
    session: &mut TransferSession,
    io_timeout: Duration,
    events: &TransferEvents,
) -> Result<()> {
    loop {
        match protocol::read_frame_with_timeout(stream, io_timeout).await? {
            Frame::Payload(data) => {
                writer.write_chunk(&data).await?;
                session.bytes_transferred = writer.bytes_written;
                let _ = events.send(TransferEvent::Progress(session.clone()));
            }
            Frame::EndOfStream => return Ok(()),
        }
    }
}
