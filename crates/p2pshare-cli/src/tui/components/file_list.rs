//! File list component.

use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use ratatui::Frame;

use p2pshare_core::file::format_size;

use crate::tui::state::AppState;
use crate::tui::theme::Theme;
use crate::ui::truncate_string;

/// File list component for choosing what to send.
pub struct FileList;

impl FileList {
    /// Render the file list.
    pub fn render(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
        let title = state.target.as_ref().map_or_else(
            || " Files ".to_string(),
            |peer| format!(" Send to {} ", peer.ip()),
        );

        let block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border_focused));

        if state.files.is_empty() {
            let paragraph = Paragraph::new(Line::from(Span::styled(
                "No files in this directory",
                Style::default().fg(theme.text_muted),
            )))
            .block(block);
            frame.render_widget(paragraph, area);
            return;
        }

        let name_width = (area.width as usize).saturating_sub(18).max(8);

        let items: Vec<ListItem> = state
            .files
            .iter()
            .map(|file| {
                let spans = vec![
                    Span::styled(
                        format!("{:<name_width$}", truncate_string(&file.name, name_width)),
                        Style::default().fg(theme.text_primary),
                    ),
                    Span::styled(
                        format!("{:>10}", format_size(file.size)),
                        Style::default().fg(theme.text_secondary),
                    ),
                ];
                ListItem::new(Line::from(spans))
            })
            .collect();

        let mut list_state = ListState::default();
        list_state.select(Some(state.file_index));

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
