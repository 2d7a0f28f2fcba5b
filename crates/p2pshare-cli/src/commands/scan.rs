//! Scan command implementation.

use anyhow::{Context, Result};

use p2pshare_core::config::{parse_duration, Config};
use p2pshare_core::discovery::{self, DiscoveryConfig, Peer};

use super::{print_suggestion, ScanArgs};
use crate::ui::format_age;

/// Run the scan command.
pub async fn run(args: ScanArgs, config: Config) -> Result<()> {
    let duration = parse_duration(&args.duration)
        .context("Invalid duration format. Use formats like '3s', '10s', '1m'")?;

    if !args.json {
        println!();
        println!(
            "Scanning for peers on UDP port {} ({})...",
            config.network.discovery_port, args.duration
        );
        println!();
    }

    let peers = match discovery::scan(DiscoveryConfig::from_config(&config), duration).await {
        Ok(peers) => peers,
        Err(e) => {
            print_suggestion(&e);
            return Err(e).context("Failed to start discovery");
        }
    };

    let transfer_port = config.network.transfer_port;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&peers_json(&peers, transfer_port))?);
    } else {
        display_peers(&peers, transfer_port);
    }

    Ok(())
}

fn peers_json(peers: &[Peer], transfer_port: u16) -> serde_json::Value {
    serde_json::json!({
        "peers": peers.iter().map(|p| serde_json::json!({
            "address": p.addr.to_string(),
            "transfer_address": p.data_addr(transfer_port).to_string(),
            "last_seen_ms": u64::try_from(p.last_seen.elapsed().as_millis()).unwrap_or(u64::MAX),
        })).collect::<Vec<_>>(),
    })
}

/// Display peers as text table.
fn display_peers(peers: &[Peer], transfer_port: u16) {
    println!("Peers on Network:");
    println!("{}", "─".repeat(60));
    println!("  {:22}  {:22}  {:10}", "Address", "Send to", "Last seen");
    println!("{}", "─".repeat(60));

    if peers.is_empty() {
        println!("  (no peers answered)");
        println!("{}", "─".repeat(60));
        return;
    }

    for peer in peers {
        println!(
            "  {:22}  {:22}  {:10}",
            peer.addr.to_string(),
            peer.data_addr(transfer_port).to_string(),
            format_age(peer.last_seen.elapsed())
        );
    }

    println!("{}", "─".repeat(60));
}
