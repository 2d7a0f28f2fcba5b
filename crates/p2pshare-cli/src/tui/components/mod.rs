//! TUI reusable components.

mod file_list;
mod peer_list;
mod progress;
mod status_bar;

pub use file_list::FileList;
pub use peer_list::PeerList;
pub use progress::ProgressDisplay;
pub use status_bar::StatusBar;
