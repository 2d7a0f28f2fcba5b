//! CLI command definitions and handlers.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use p2pshare_core::config::Config;

pub mod receive;
pub mod scan;
pub mod send;
pub mod tui;

/// Load configuration, apply command-line overrides and validate.
///
/// A config file that cannot be read or parsed is reported and replaced by
/// the defaults; an invalid value after overrides is an error.
pub fn load_config(overrides: &NetworkArgs) -> Result<Config> {
    let mut config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Ignoring config file {}: {}", Config::config_path().display(), e);
        Config::default()
    });

    overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

/// Print the error's recovery hint, if the core error has one.
pub fn print_suggestion(err: &p2pshare_core::Error) {
    if let Some(suggestion) = err.suggestion() {
        eprintln!();
        eprintln!("Suggestion:");
        for line in suggestion.lines() {
            eprintln!("  {line}");
        }
        eprintln!();
    }
}

/// p2pshare - find peers on the local network and send them a file
#[derive(Parser)]
#[command(name = "p2pshare")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Network overrides shared by every command
    #[command(flatten)]
    pub network: NetworkArgs,

    /// The command to execute (defaults to the interactive picker)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Interactive peer and file picker
    Tui(tui::TuiArgs),

    /// List peers currently answering on the network
    Scan(ScanArgs),

    /// Send a file to a peer address
    Send(SendArgs),

    /// Accept incoming files until interrupted
    Receive(ReceiveArgs),
}

impl Default for Command {
    fn default() -> Self {
        Self::Tui(tui::TuiArgs::default())
    }
}

/// Port overrides; both peers must use the same values.
#[derive(Args, Debug, Default)]
pub struct NetworkArgs {
    /// UDP discovery port
    #[arg(long, global = true, env = "P2PSHARE_DISCOVERY_PORT")]
    pub discovery_port: Option<u16>,

    /// TCP transfer port
    #[arg(long, global = true, env = "P2PSHARE_TRANSFER_PORT")]
    pub transfer_port: Option<u16>,
}

impl NetworkArgs {
    /// Overwrite config values that were given on the command line.
    pub fn apply(&self, config: &mut Config) {
        if let Some(port) = self.discovery_port {
            config.network.discovery_port = port;
        }
        if let Some(port) = self.transfer_port {
            config.network.transfer_port = port;
        }
    }
}

/// Arguments for the scan command
#[derive(Parser)]
pub struct ScanArgs {
    /// How long to listen (e.g., 3s, 10s, 1m)
    #[arg(short, long, default_value = "3s")]
    pub duration: String,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the send command
#[derive(Parser)]
pub struct SendArgs {
    /// File to send
    pub file: PathBuf,

    /// Peer address: IP, or IP:PORT to override the transfer port
    pub peer: String,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the receive command
#[derive(Parser)]
pub struct ReceiveArgs {
    /// Directory to save received files (default: config or current directory)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Exit after the first transfer finishes
    #[arg(long)]
    pub once: bool,

    /// Do not answer discovery probes
    #[arg(long)]
    pub hidden: bool,

    /// Minimal output
    #[arg(short, long)]
    pub quiet: bool,
}
