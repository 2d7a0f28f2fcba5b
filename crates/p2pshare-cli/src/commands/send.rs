//! Send command implementation.
//!
//! Sends one file to an explicit address, bypassing discovery.

use std::io::{self, Write};

use anyhow::{Context, Result};
use tokio::sync::broadcast::error::RecvError;

use p2pshare_core::config::Config;
use p2pshare_core::connection::parse_host_address;
use p2pshare_core::file::format_size;
use p2pshare_core::session::{Coordinator, StatusEvent};
use p2pshare_core::transfer::{TransferOutcome, TransferSession, TransferState};

use super::SendArgs;
use crate::ui::progress_line;

/// Run the send command.
pub async fn run(args: SendArgs, config: Config) -> Result<()> {
    let addr = parse_host_address(&args.peer, config.network.transfer_port)?;

    let coordinator = Coordinator::new(config);
    let mut status = coordinator.subscribe();

    let id = coordinator
        .send_file_to(&args.file, addr)
        .await
        .with_context(|| format!("Cannot send {}", args.file.display()))?;

    if !args.quiet {
        println!();
        println!("p2pshare v{}", p2pshare_core::VERSION);
        println!("{}", "-".repeat(37));
        println!();
        println!("  Sending {} to {}", args.file.display(), addr);
        println!();
    }

    let outcome = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                coordinator.cancel_send().await;
            }
            event = status.recv() => match event {
                Ok(StatusEvent::TransferProgress(session)) if session.id == id => {
                    if !args.quiet {
                        display_progress(&session);
                    }
                }
                Ok(StatusEvent::TransferFinished(session, outcome)) if session.id == id => {
                    break outcome;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => anyhow::bail!("Status feed closed unexpectedly"),
            },
        }
    };

    report(&outcome, args.quiet)
}

fn display_progress(session: &TransferSession) {
    match session.state {
        TransferState::Connecting => {
            println!("  Connecting to {}...", session.peer);
        }
        TransferState::Streaming => {
            print!("\r  {}    ", progress_line(session));
            let _ = io::stdout().flush();
        }
        TransferState::Idle | TransferState::Completed | TransferState::Failed => {}
    }
}

fn report(outcome: &TransferOutcome, quiet: bool) -> Result<()> {
    match outcome {
        TransferOutcome::Completed { bytes } => {
            if !quiet {
                println!();
                println!();
                println!("  Transfer complete! ({})", format_size(*bytes));
                println!();
            }
            Ok(())
        }
        TransferOutcome::Failed(reason) => {
            if !quiet {
                println!();
            }
            anyhow::bail!("Send failed: {}", reason)
        }
    }
}
