//! UI utilities for the p2pshare CLI.

use std::time::Duration;

use p2pshare_core::file::format_size;
use p2pshare_core::transfer::TransferSession;

/// Truncate a string to fit within a maximum width.
pub fn truncate_string(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max_len.saturating_sub(1)).collect();
        format!("{}…", truncated)
    }
}

/// Format how long ago something happened, e.g. "0.4s ago".
pub fn format_age(age: Duration) -> String {
    if age < Duration::from_secs(60) {
        format!("{:.1}s ago", age.as_secs_f64())
    } else {
        format!("{}m ago", age.as_secs() / 60)
    }
}

/// One-line progress summary for a running transfer.
pub fn progress_line(session: &TransferSession) -> String {
    let done = format_size(session.bytes_transferred);
    let speed = format_size(session.bytes_per_second());

    match (session.percentage(), session.total_size) {
        (Some(pct), Some(total)) => format!(
            "[{:>6.2}%] {} - {} / {} - {}/s",
            pct,
            session.file_name,
            done,
            format_size(total),
            speed
        ),
        _ => format!("{} - {} - {}/s", session.file_name, done, speed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use p2pshare_core::transfer::{TransferRole, TransferState};
    use uuid::Uuid;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("exactly10!", 10), "exactly10!");
        assert_eq!(truncate_string("this is too long", 10), "this is t…");
    }

    #[test]
    fn test_format_age() {
        assert_eq!(format_age(Duration::from_millis(400)), "0.4s ago");
        assert_eq!(format_age(Duration::from_secs(125)), "2m ago");
    }

    #[test]
    fn test_progress_line() {
        let session = TransferSession {
            id: Uuid::nil(),
            role: TransferRole::Sender,
            peer: "10.0.0.5:9000".parse().unwrap(),
            file_name: "video.mp4".to_string(),
            local_path: None,
            total_size: Some(4096),
            bytes_transferred: 1024,
            state: TransferState::Streaming,
            started_at: Utc::now(),
        };

        let line = progress_line(&session);
        assert!(line.starts_with("[ 25.00%] video.mp4 - 1.0 KB / 4.0 KB"));
    }
}
