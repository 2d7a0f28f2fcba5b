//! Status bar component.
//!
//! Shows the latest status message and the key hints for the current stage.

use ratatui::layout::Rect;
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use ratatui::Frame;

use crate::tui::state::{AppState, Stage, StatusLevel};
use crate::tui::theme::Theme;

/// Status bar component.
pub struct StatusBar;

impl StatusBar {
    /// Render the status bar.
    pub fn render(frame: &mut Frame, area: Rect, state: &AppState, theme: &Theme) {
        let block = Block::default()
            .title(" Status ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border));

        let color = match state.status.level {
            StatusLevel::Info => theme.info,
            StatusLevel::Progress => theme.accent,
            StatusLevel::Success => theme.success,
            StatusLevel::Error => theme.error,
        };

        let message = Line::from(Span::styled(
            state.status.message.as_str(),
            Style::default().fg(color).add_modifier(Modifier::BOLD),
        ));

        let paragraph = Paragraph::new(vec![message, Self::hints(state, theme)])
            .block(block)
            .wrap(Wrap { trim: true });

        frame.render_widget(paragraph, area);
    }

    fn hints(state: &AppState, theme: &Theme) -> Line<'static> {
        let key = |k: &'static str| Span::styled(k, Style::default().fg(theme.text_secondary));
        let text = |t: &'static str| Span::styled(t, Style::default().fg(theme.text_muted));

        let mut spans = vec![key("[↑↓]"), text(" Move  "), key("[Enter]")];
        match state.stage {
            Stage::Peers => spans.push(text(" Choose peer  ")),
            Stage::Files => {
                spans.push(text(" Send file  "));
                spans.push(key("[Bksp]"));
                spans.push(text(" Back  "));
            }
        }
        if state.is_sending() {
            spans.push(key("[C]"));
            spans.push(text(" Cancel  "));
        }
        spans.push(key("[R]"));
        spans.push(text(" Rescan  "));
        spans.push(key("[Q]"));
        spans.push(text(" Quit"));

        Line::from(spans)
    }
}
