//! Terminal UI for p2pshare.
//!
//! The TUI lists peers as discovery finds them, lets the user pick one and
//! then a file from the working directory, and shows send progress. It also
//! accepts incoming files for as long as it runs.
//!
//! - `app`: terminal setup and the main loop
//! - `state`: plain state updated from keys and the status feed
//! - `action`: user intents
//! - `event`: terminal polling and key mapping
//! - `components`: list, gauge and status widgets
//! - `theme`: color themes

#![allow(
    clippy::missing_const_for_fn,
    clippy::option_if_let_else,
    clippy::cast_possible_truncation
)]

pub mod action;
pub mod app;
pub mod components;
pub mod event;
pub mod state;
pub mod theme;

pub use app::{App, TuiArgs};

use p2pshare_core::config::Config;

/// Run the TUI application.
///
/// Console logging must already be off; anything written to stderr would
/// corrupt the alternate screen.
pub async fn run(args: TuiArgs, config: Config) -> anyhow::Result<()> {
    let mut app = App::new(args, config)?;
    app.run().await
}
