//! TUI command handler.

use anyhow::Result;

use p2pshare_core::config::Config;

use crate::tui;

/// Arguments for the TUI command.
#[derive(clap::Parser, Debug, Default)]
pub struct TuiArgs {
    /// Theme to use (dark, light)
    #[arg(long)]
    pub theme: Option<String>,

    /// Directory to list files from (default: current directory)
    #[arg(long, short)]
    pub dir: Option<std::path::PathBuf>,
}

/// Run the TUI application.
pub async fn run(args: TuiArgs, config: Config) -> Result<()> {
    let tui_args = tui::TuiArgs {
        theme: args.theme.unwrap_or_else(|| config.ui.theme.clone()),
        dir: args.dir,
    };

    tui::run(tui_args, config).await
}
