//! TUI action types.
//!
//! Actions represent user intents decoded from key events.

/// Actions that can be triggered by user input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Leave the TUI
    Quit,
    /// Move the highlight up
    Up,
    /// Move the highlight down
    Down,
    /// Choose the highlighted peer or file
    Select,
    /// Return to the peer list
    Back,
    /// Restart discovery and reload the file list
    Rescan,
    /// Abort the running send
    CancelSend,
    /// Nothing to do
    None,
}
