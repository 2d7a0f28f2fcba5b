//! TUI event handling.
//!
//! Polls the terminal on a background task and maps key presses to actions.

use std::time::Duration;

use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::action::Action;
use super::state::{AppState, Stage};

/// Event handler that polls for terminal events.
pub struct EventHandler {
    rx: mpsc::UnboundedReceiver<Event>,
    cancel_token: CancellationToken,
}

impl EventHandler {
    /// Create a new event handler.
    ///
    /// This spawns a background task that polls for terminal events.
    pub fn new(tick_rate: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();

        tokio::task::spawn_blocking(move || {
            while !token.is_cancelled() {
                if event::poll(tick_rate).unwrap_or(false) {
                    if let Ok(event) = event::read() {
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                }
            }
        });

        Self { rx, cancel_token }
    }

    /// Cancel the event polling task.
    pub fn cancel(&self) {
        self.cancel_token.cancel();
    }

    /// Get the next event, if available.
    pub async fn next(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

/// Map a key event to an action based on current state.
pub fn map_key_event(key: KeyEvent, state: &AppState) -> Action {
    // windows reports releases too
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }

    match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => Action::Quit,
        KeyCode::Char('q' | 'Q') | KeyCode::Esc => Action::Quit,
        KeyCode::Backspace | KeyCode::Left if state.stage == Stage::Files => Action::Back,
        KeyCode::Up | KeyCode::Char('k') => Action::Up,
        KeyCode::Down | KeyCode::Char('j') => Action::Down,
        KeyCode::Enter | KeyCode::Right => Action::Select,
        KeyCode::Char('r' | 'R') => Action::Rescan,
        KeyCode::Char('c' | 'C') if state.is_sending() => Action::CancelSend,
        _ => Action::None,
    }
}
