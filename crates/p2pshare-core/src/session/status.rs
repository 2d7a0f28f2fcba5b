//! Status feed events.

use crate::discovery::PeerSnapshot;
use crate::file::format_size;
use crate::transfer::{
    TransferOutcome, TransferRole, TransferSession, TransferState,
};

/// Everything the presentation layer needs to know about.
#[derive(Debug, Clone)]
pub enum StatusEvent {
    /// Peer membership changed
    PeerListChanged(PeerSnapshot),
    /// A transfer changed state or moved bytes
    TransferProgress(TransferSession),
    /// A transfer ended
    TransferFinished(TransferSession, TransferOutcome),
    /// Discovery could not start (port taken); emitted once per attempt
    DiscoveryFailed(String),
    /// Discovery keeps running but something went wrong
    DiscoveryWarning(String),
    /// The receive listener could not bind or accept
    ReceiverFailed(String),
}

impl StatusEvent {
    /// One-line human-readable description.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::PeerListChanged(snapshot) => match snapshot.len() {
                0 => "No peers yet, still searching...".to_string(),
                1 => "1 peer found! Select one".to_string(),
                n => format!("{n} peers found! Select one"),
            },
            Self::TransferProgress(session) => progress_message(session),
            Self::TransferFinished(session, outcome) => finished_message(session, outcome),
            Self::DiscoveryFailed(reason) => format!("Discovery unavailable: {reason}"),
            Self::DiscoveryWarning(reason) => format!("Discovery warning: {reason}"),
            Self::ReceiverFailed(reason) => format!("Receiver error: {reason}"),
        }
    }

    /// Whether the event reports a failure.
    #[must_use]
    pub fn is_error(&self) -> bool {
        match self {
            Self::TransferFinished(_, outcome) => !outcome.is_completed(),
            Self::DiscoveryFailed(_) | Self::ReceiverFailed(_) => true,
            Self::PeerListChanged(_) | Self::TransferProgress(_) | Self::DiscoveryWarning(_) => {
                false
            }
        }
    }
}

fn progress_message(session: &TransferSession) -> String {
    let percent = session
        .percentage()
        .map_or_else(String::new, |p| format!(" {p:.0}%"));

    match (session.role, session.state) {
        (TransferRole::Sender, TransferState::Connecting) => {
            format!("Connecting to {}...", session.peer.ip())
        }
        (TransferRole::Sender, _) => format!(
            "Sending file {} to {}{}",
            session.file_name,
            session.peer.ip(),
            percent
        ),
        (TransferRole::Receiver, TransferState::Connecting) => {
            format!("Incoming transfer from {}...", session.peer.ip())
        }
        (TransferRole::Receiver, _) => format!(
            "Receiving {} from {}{}",
            session.file_name,
            session.peer.ip(),
            percent
        ),
    }
}

fn finished_message(session: &TransferSession, outcome: &TransferOutcome) -> String {
    match (session.role, outcome) {
        (TransferRole::Sender, TransferOutcome::Completed { bytes }) => format!(
            "Sent {} to {} ({})",
            session.file_name,
            session.peer.ip(),
            format_size(*bytes)
        ),
        (TransferRole::Sender, TransferOutcome::Failed(reason)) => {
            format!("Send failed: {reason}")
        }
        (TransferRole::Receiver, TransferOutcome::Completed { bytes }) => {
            let saved = session
                .local_path
                .as_ref()
                .map_or_else(|| session.file_name.clone(), |p| p.display().to_string());
            format!(
                "Received {} from {} ({}), saved to {}",
                session.file_name,
                session.peer.ip(),
                format_size(*bytes),
                saved
            )
        }
        (TransferRole::Receiver, TransferOutcome::Failed(reason)) => format!(
            "Receiving {} from {} failed: {reason}",
            session.file_name,
            session.peer.ip()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::FailureReason;
    use chrono::Utc;
    use uuid::Uuid;

    fn session(role: TransferRole, state: TransferState) -> TransferSession {
        TransferSession {
            id: Uuid::new_v4(),
            role,
            peer: "192.168.1.7:9000".parse().unwrap(),
            file_name: "photo.jpg".to_string(),
            local_path: None,
            total_size: Some(1000),
            bytes_transferred: 500,
            state,
            started_at: Utc::now(),
        }
    }

    #[test]
    fn test_messages_are_distinct() {
        let no_peers = StatusEvent::PeerListChanged(PeerSnapshot::default()).message();
        let refused = StatusEvent::TransferFinished(
            session(TransferRole::Sender, TransferState::Failed),
            TransferOutcome::Failed(FailureReason::DialFailure("connection refused".into())),
        )
        .message();
        let truncated = StatusEvent::TransferFinished(
            session(TransferRole::Receiver, TransferState::Failed),
            TransferOutcome::Failed(FailureReason::Truncated),
        )
        .message();

        assert!(no_peers.to_lowercase().contains("no peers yet"));
        assert!(refused.to_lowercase().contains("send failed: connection refused"));
        assert!(truncated.contains("transfer truncated"));
        assert_ne!(no_peers, refused);
        assert_ne!(refused, truncated);
    }

    #[test]
    fn test_progress_message() {
        let event = StatusEvent::TransferProgress(session(
            TransferRole::Sender,
            TransferState::Streaming,
        ));
        assert_eq!(event.message(), "Sending file photo.jpg to 192.168.1.7 50%");
        assert!(!event.is_error());
    }

    #[test]
    fn test_error_classification() {
        assert!(StatusEvent::DiscoveryFailed("port in use".into()).is_error());
        assert!(!StatusEvent::DiscoveryWarning("probe failed".into()).is_error());
        assert!(!StatusEvent::TransferFinished(
            session(TransferRole::Sender, TransferState::Completed),
            TransferOutcome::Completed { bytes: 1000 },
        )
        .is_error());
    }
}
