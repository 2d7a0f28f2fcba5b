//! Receive command implementation.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::broadcast::{self, error::RecvError};

use p2pshare_core::config::Config;
use p2pshare_core::file::UniqueNamePolicy;
use p2pshare_core::session::{Coordinator, StatusEvent};
use p2pshare_core::transfer::{TransferRole, TransferState};

use super::{print_suggestion, ReceiveArgs};
use crate::ui::progress_line;

/// Run the receive command.
pub async fn run(args: ReceiveArgs, config: Config) -> Result<()> {
    let output_dir = output_dir(args.output.clone(), &config);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Cannot create output directory {}", output_dir.display()))?;

    let coordinator = Coordinator::new(config);
    let mut status = coordinator.subscribe();

    let addr = match coordinator
        .start_receiving(Arc::new(UniqueNamePolicy::new(&output_dir)))
        .await
    {
        Ok(addr) => addr,
        Err(e) => {
            print_suggestion(&e);
            return Err(e).context("Failed to start receiving");
        }
    };

    if !args.hidden {
        if let Err(e) = coordinator.start_discovery().await {
            tracing::warn!("Peers will not find this instance: {}", e);
        }
    }

    if !args.quiet {
        println!();
        println!("p2pshare v{}", p2pshare_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Listening on {}", addr);
        println!("  Saving to {}", output_dir.display());
        println!();
        println!("  Press Ctrl+C to stop.");
        println!();
    }

    let result = receive_loop(&mut status, &args).await;
    coordinator.shutdown().await;
    result
}

async fn receive_loop(
    status: &mut broadcast::Receiver<StatusEvent>,
    args: &ReceiveArgs,
) -> Result<()> {
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if !args.quiet {
                    println!();
                    println!("  Stopped.");
                }
                return Ok(());
            }
            event = status.recv() => match event {
                Ok(event) => {
                    if handle_event(&event, args) {
                        return Ok(());
                    }
                }
                Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return Ok(()),
            },
        }
    }
}

/// Print one status event. Returns `true` when the command should exit.
fn handle_event(event: &StatusEvent, args: &ReceiveArgs) -> bool {
    match event {
        StatusEvent::TransferProgress(session) if session.role == TransferRole::Receiver => {
            if args.quiet {
                return false;
            }
            if session.state == TransferState::Streaming {
                print!("\r  {}    ", progress_line(session));
                let _ = io::stdout().flush();
            }
            false
        }
        StatusEvent::TransferFinished(session, _) if session.role == TransferRole::Receiver => {
            if !args.quiet {
                println!();
                println!("  {}", event.message());
                println!();
            }
            args.once
        }
        StatusEvent::ReceiverFailed(_) | StatusEvent::DiscoveryWarning(_) => {
            if !args.quiet {
                eprintln!("  {}", event.message());
            }
            false
        }
        _ => false,
    }
}

fn output_dir(requested: Option<PathBuf>, config: &Config) -> PathBuf {
    requested
        .or_else(|| config.transfer.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_dir_precedence() {
        let mut config = Config::default();
        assert_eq!(output_dir(None, &config), PathBuf::from("."));

        config.transfer.output_dir = Some(PathBuf::from("/srv/inbox"));
        assert_eq!(output_dir(None, &config), PathBuf::from("/srv/inbox"));
        assert_eq!(
            output_dir(Some(PathBuf::from("here")), &config),
            PathBuf::from("here")
        );
    }
}
