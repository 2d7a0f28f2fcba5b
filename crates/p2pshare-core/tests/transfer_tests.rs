//! End-to-end transfers through the coordinator on loopback.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use p2pshare_core::file::UniqueNamePolicy;
use p2pshare_core::protocol::{self, TransferHeader};
use p2pshare_core::transfer::{FailureReason, TransferOutcome, TransferRole, TransferState};
use p2pshare_core::Error;
use p2pshare_core::session::StatusEvent;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

use common::{
    assert_files_equal, create_temp_dir, create_test_file, loopback_coordinator, next_port,
    random_bytes, wait_for_finished,
};

const TEN_MIB: usize = 10 * 1024 * 1024;

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Wait until a session of `role` reports `bytes` or more while streaming.
async fn wait_for_streaming(
    status: &mut broadcast::Receiver<StatusEvent>,
    role: TransferRole,
    bytes: u64,
) {
    tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            match status.recv().await {
                Ok(StatusEvent::TransferProgress(session))
                    if session.role == role
                        && session.state == TransferState::Streaming
                        && session.bytes_transferred >= bytes =>
                {
                    return;
                }
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("status feed closed"),
            }
        }
    })
    .await
    .expect("transfer did not start streaming in time");
}

/// A 10 MiB file arrives byte-identical and both sides report completion.
#[tokio::test]
async fn test_large_file_roundtrip() {
    let source_dir = create_temp_dir();
    let inbox = create_temp_dir();
    let source = create_test_file(source_dir.path(), "payload.bin", &random_bytes(TEN_MIB));

    let transfer_port = next_port();
    let receiver = loopback_coordinator(next_port(), next_port(), transfer_port);
    let sender = loopback_coordinator(next_port(), next_port(), transfer_port);
    let mut receiver_status = receiver.subscribe();
    let mut sender_status = sender.subscribe();

    receiver
        .start_receiving(Arc::new(UniqueNamePolicy::new(inbox.path())))
        .await
        .expect("start receiving");

    sender
        .send_file_to(&source, loopback(transfer_port))
        .await
        .expect("send accepted");

    let (sent, sent_outcome) =
        wait_for_finished(&mut sender_status, TransferRole::Sender, Duration::from_secs(30)).await;
    let (received, received_outcome) = wait_for_finished(
        &mut receiver_status,
        TransferRole::Receiver,
        Duration::from_secs(30),
    )
    .await;

    assert_eq!(sent_outcome, TransferOutcome::Completed { bytes: TEN_MIB as u64 });
    assert_eq!(received_outcome, TransferOutcome::Completed { bytes: TEN_MIB as u64 });
    assert_eq!(sent.state, TransferState::Completed);
    assert_eq!(received.file_name, "payload.bin");

    let saved = received.local_path.expect("destination recorded");
    assert_eq!(saved, inbox.path().join("payload.bin"));
    assert_files_equal(&source, &saved);
    assert!(!sender.is_sending());

    receiver.shutdown().await;
}

/// A sender that disappears mid-stream leaves a truncated partial file.
#[tokio::test]
async fn test_sender_drop_mid_stream_is_truncated() {
    let inbox = create_temp_dir();
    let transfer_port = next_port();
    let receiver = loopback_coordinator(next_port(), next_port(), transfer_port);
    let mut status = receiver.subscribe();

    receiver
        .start_receiving(Arc::new(UniqueNamePolicy::new(inbox.path())))
        .await
        .expect("start receiving");

    let mut client = TcpStream::connect(loopback(transfer_port))
        .await
        .expect("connect");
    let header = protocol::encode_header(&TransferHeader::new("movie.mkv", TEN_MIB as u64))
        .expect("encode header");
    protocol::write_frame(&mut client, &header).await.unwrap();
    for chunk in random_bytes(1024 * 1024).chunks(64 * 1024) {
        protocol::write_frame(&mut client, chunk).await.unwrap();
    }
    client.flush().await.unwrap();
    drop(client);

    let (session, outcome) =
        wait_for_finished(&mut status, TransferRole::Receiver, Duration::from_secs(10)).await;

    assert_eq!(outcome, TransferOutcome::Failed(FailureReason::Truncated));
    assert_eq!(session.state, TransferState::Failed);
    assert_eq!(session.bytes_transferred, 1024 * 1024);

    let partial = inbox.path().join("movie.mkv");
    assert_eq!(std::fs::metadata(partial).unwrap().len(), 1024 * 1024);

    receiver.shutdown().await;
}

/// A second send while one is streaming is rejected; the first still completes.
#[tokio::test]
async fn test_concurrent_send_is_busy() {
    let source_dir = create_temp_dir();
    let inbox = create_temp_dir();
    let first = create_test_file(source_dir.path(), "first.bin", &random_bytes(TEN_MIB));
    let second = create_test_file(source_dir.path(), "second.bin", b"second");

    let transfer_port = next_port();
    let receiver = loopback_coordinator(next_port(), next_port(), transfer_port);
    let sender = loopback_coordinator(next_port(), next_port(), transfer_port);
    let mut sender_status = sender.subscribe();

    receiver
        .start_receiving(Arc::new(UniqueNamePolicy::new(inbox.path())))
        .await
        .expect("start receiving");

    sender
        .send_file_to(&first, loopback(transfer_port))
        .await
        .expect("first send accepted");
    assert!(sender.is_sending());

    let err = sender
        .send_file_to(&second, loopback(transfer_port))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Busy));

    let (_, outcome) =
        wait_for_finished(&mut sender_status, TransferRole::Sender, Duration::from_secs(30)).await;
    assert_eq!(outcome, TransferOutcome::Completed { bytes: TEN_MIB as u64 });
    assert!(!sender.is_sending());

    receiver.shutdown().await;
}

/// Sending to an address nobody listens on fails with a refused dial.
#[tokio::test]
async fn test_send_without_receiver_is_refused() {
    let source_dir = create_temp_dir();
    let source = create_test_file(source_dir.path(), "lonely.txt", b"anyone?");

    let sender = loopback_coordinator(next_port(), next_port(), next_port());
    let mut status = sender.subscribe();
    let target = loopback(next_port());

    sender.send_file_to(&source, target).await.expect("accepted");
    let (_, outcome) =
        wait_for_finished(&mut status, TransferRole::Sender, Duration::from_secs(10)).await;

    assert_eq!(
        outcome,
        TransferOutcome::Failed(FailureReason::DialFailure("connection refused".to_string()))
    );
}

/// Receiving twice into the same directory never overwrites.
#[tokio::test]
async fn test_repeated_receive_keeps_both_files() {
    let source_dir = create_temp_dir();
    let inbox = create_temp_dir();
    let source = create_test_file(source_dir.path(), "notes.txt", b"version one");

    let transfer_port = next_port();
    let receiver = loopback_coordinator(next_port(), next_port(), transfer_port);
    let sender = loopback_coordinator(next_port(), next_port(), transfer_port);
    let mut sender_status = sender.subscribe();

    receiver
        .start_receiving(Arc::new(UniqueNamePolicy::new(inbox.path())))
        .await
        .expect("start receiving");

    for _ in 0..2 {
        sender
            .send_file_to(&source, loopback(transfer_port))
            .await
            .expect("send accepted");
        let (_, outcome) =
            wait_for_finished(&mut sender_status, TransferRole::Sender, Duration::from_secs(10))
                .await;
        assert!(outcome.is_completed());
    }

    // sender completion can precede the receiver's final sync
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(inbox.path().join("notes.txt").exists());
    assert!(inbox.path().join("notes (1).txt").exists());

    receiver.shutdown().await;
}

/// Cancelling a send mid-stream fails it as cancelled and closes the socket.
#[tokio::test]
async fn test_cancel_send_mid_stream() {
    let source_dir = create_temp_dir();
    let source = create_test_file(source_dir.path(), "huge.bin", &vec![7u8; 64 * 1024 * 1024]);

    // reads the header and one frame, then stops reading so the sender stalls
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let target = listener.local_addr().unwrap();
    let slow_reader = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        protocol::read_frame(&mut stream).await.unwrap();
        protocol::read_frame(&mut stream).await.unwrap();
        stream
    });

    let sender = loopback_coordinator(next_port(), next_port(), next_port());
    let mut status = sender.subscribe();
    sender.send_file_to(&source, target).await.expect("send accepted");

    wait_for_streaming(&mut status, TransferRole::Sender, 1).await;
    assert!(sender.cancel_send().await);

    let (session, outcome) =
        wait_for_finished(&mut status, TransferRole::Sender, Duration::from_secs(10)).await;
    assert_eq!(outcome, TransferOutcome::Failed(FailureReason::Cancelled));
    assert_eq!(session.state, TransferState::Failed);
    assert!(session.bytes_transferred < 64 * 1024 * 1024);
    assert!(!sender.is_sending());

    let mut stream = slow_reader.await.unwrap();
    let end = tokio::time::timeout(Duration::from_secs(10), async {
        loop {
            if let Err(e) = protocol::read_frame(&mut stream).await {
                return e;
            }
        }
    })
    .await
    .expect("socket closed after cancel");
    assert!(matches!(
        end,
        Error::Truncated { .. } | Error::ConnectionReset
    ));
}

/// Stopping the receiver cancels a receive that is still in flight.
#[tokio::test]
async fn test_stop_receiving_cancels_inflight_receive() {
    let inbox = create_temp_dir();
    let transfer_port = next_port();
    let receiver = loopback_coordinator(next_port(), next_port(), transfer_port);
    let mut status = receiver.subscribe();

    receiver
        .start_receiving(Arc::new(UniqueNamePolicy::new(inbox.path())))
        .await
        .expect("start receiving");

    let mut client = TcpStream::connect(loopback(transfer_port))
        .await
        .expect("connect");
    let header = protocol::encode_header(&TransferHeader::new("slow.bin", 1000))
        .expect("encode header");
    protocol::write_frame(&mut client, &header).await.unwrap();
    protocol::write_frame(&mut client, &[5u8; 100]).await.unwrap();
    client.flush().await.unwrap();

    wait_for_streaming(&mut status, TransferRole::Receiver, 100).await;
    receiver.stop_receiving().await;

    let (session, outcome) =
        wait_for_finished(&mut status, TransferRole::Receiver, Duration::from_secs(10)).await;
    assert_eq!(outcome, TransferOutcome::Failed(FailureReason::Cancelled));
    assert_eq!(session.bytes_transferred, 100);
    assert!(inbox.path().join("slow.bin").exists(), "partial file stays");
    assert_eq!(receiver.receiving_addr().await, None);

    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(5), client.read(&mut buf))
        .await
        .expect("receiver closed the connection");
    assert!(matches!(read, Ok(0) | Err(_)));
}
