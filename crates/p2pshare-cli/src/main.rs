//! p2pshare CLI - find peers on the local network and send them a file
//!
//! ## Quick Start
//!
//! ```bash
//! # Interactive peer and file picker
//! p2pshare
//!
//! # Accept files into ~/Downloads
//! p2pshare receive --output ~/Downloads
//!
//! # Send a file straight to a known address
//! p2pshare send ./report.pdf 192.168.1.42
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;

mod commands;
mod tui;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let command = cli.command.unwrap_or_default();

    // the TUI owns the terminal; console logging would tear the screen
    if !matches!(command, Command::Tui(_)) {
        init_logging();
    }

    let config = commands::load_config(&cli.network)?;

    match command {
        Command::Tui(args) => commands::tui::run(args, config).await,
        Command::Scan(args) => commands::scan::run(args, config).await,
        Command::Send(args) => commands::send::run(args, config).await,
        Command::Receive(args) => commands::receive::run(args, config).await,
    }
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,p2pshare=info,p2pshare_core=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time())
        .with(filter)
        .init();
}
