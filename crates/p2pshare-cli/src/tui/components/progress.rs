//! Transfer progress component.

use ratatui::layout::Rect;
use ratatui::style::Style;
use ratatui::widgets::{Block, Borders, Gauge};
use ratatui::Frame;

use p2pshare_core::transfer::{TransferSession, TransferState};

use crate::tui::theme::Theme;
use crate::ui::progress_line;

/// Gauge for the running send.
pub struct ProgressDisplay;

impl ProgressDisplay {
    /// Render transfer progress.
    pub fn render(frame: &mut Frame, area: Rect, session: &TransferSession, theme: &Theme) {
        let block = Block::default()
            .title(" Sending ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(theme.border));

        let (ratio, label) = match session.state {
            TransferState::Connecting => (0.0, format!("Connecting to {}...", session.peer)),
            _ => (
                session.percentage().unwrap_or(0.0) / 100.0,
                progress_line(session),
            ),
        };

        let gauge = Gauge::default()
            .block(block)
            .gauge_style(
                Style::default()
                    .fg(theme.progress_bar)
                    .bg(theme.progress_bar_bg),
            )
            .ratio(ratio.clamp(0.0, 1.0))
            .label(label);

        frame.render_widget(gauge, area);
    }
}
