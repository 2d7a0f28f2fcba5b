//! Peer list component.
//!
//! Shows every peer in the current snapshot with how recently it answered.

use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use crate::tui::state::{AppState, Stage};
use crate::tui::theme::Theme;
use crate::ui::format_age;

/// Peer list component.
pub struct PeerList;

impl PeerList {
    /// Render the peer list.
    pub fn render(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
        let focused = state.stage == Stage::Peers;
        let border_style = if focused {
            Style::default().fg(theme.border_focused)
        } else {
            Style::default().fg(theme.border)
        };

        let block = Block::default()
            .title(format!(" Peers ({}) ", state.peers.len()))
            .borders(Borders::ALL)
            .border_style(border_style);

        if state.peers.is_empty() {
            let text = if state.discovery_available {
                "Searching the local network..."
            } else {
                "Discovery is not running. Press r to retry."
            };
            let paragraph = Paragraph::new(Line::from(Span::styled(
                text,
                Style::default().fg(theme.text_muted),
            )))
            .block(block);
            frame.render_widget(paragraph, area);
            return;
        }

        let items: Vec<ListItem> = state
            .peers
            .peers
            .iter()
            .map(|peer| {
                let spans = vec![
                    Span::styled("● ", Style::default().fg(theme.success)),
                    Span::styled(
                        peer.ip().to_string(),
                        Style::default().fg(theme.text_primary),
                    ),
                    Span::raw("  "),
                    Span::styled(
                        format_age(peer.last_seen.elapsed()),
                        Style::default().fg(theme.text_muted),
                    ),
                ];
                ListItem::new(Line::from(spans))
            })
            .collect();

        let mut list_state = ListState::default();
        list_state.select(Some(state.peer_index));

        let list = List::new(items)
            .block(block)
            .highlight_style(
                Style::default()
                    .bg(theme.selection)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("> ");

        frame.render_stateful_widget(list, area, &mut list_state);
    }
}
