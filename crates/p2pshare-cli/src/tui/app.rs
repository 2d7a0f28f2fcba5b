//! TUI application main loop.

use std::io::{self, Stdout};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::event::Event;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::Paragraph;
use ratatui::Terminal;
use tokio::sync::broadcast::{self, error::TryRecvError};

use p2pshare_core::config::Config;
use p2pshare_core::file::UniqueNamePolicy;
use p2pshare_core::session::{Coordinator, StatusEvent};
use p2pshare_core::Error;

use super::action::Action;
use super::components::{FileList, PeerList, ProgressDisplay, StatusBar};
use super::event::{map_key_event, EventHandler};
use super::state::{load_files, AppState, Stage, StatusLevel};
use super::theme::Theme;

/// TUI arguments after config defaults are applied.
#[derive(Debug, Clone)]
pub struct TuiArgs {
    /// Theme name
    pub theme: String,
    /// Directory whose files are offered for sending
    pub dir: Option<PathBuf>,
}

/// Main TUI application.
pub struct App {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    state: AppState,
    events: EventHandler,
    theme: Theme,
    coordinator: Coordinator,
    status_rx: broadcast::Receiver<StatusEvent>,
    /// Directory listed in the file stage
    dir: PathBuf,
    /// Where incoming files land
    inbox: PathBuf,
    should_quit: bool,
}

impl App {
    /// Create a new TUI application.
    pub fn new(args: TuiArgs, config: Config) -> Result<Self> {
        let dir = match args.dir {
            Some(dir) => dir,
            None => std::env::current_dir().context("Cannot read current directory")?,
        };
        let files =
            load_files(&dir).with_context(|| format!("Cannot list {}", dir.display()))?;
        let inbox = config
            .transfer
            .output_dir
            .clone()
            .unwrap_or_else(|| dir.clone());

        let coordinator = Coordinator::new(config);
        let status_rx = coordinator.subscribe();

        enable_raw_mode()?;
        let mut stdout = io::stdout();
        stdout.execute(EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            state: AppState::new(files),
            events: EventHandler::new(Duration::from_millis(100)),
            theme: Theme::from_name(&args.theme),
            coordinator,
            status_rx,
            dir,
            inbox,
            should_quit: false,
        })
    }

    /// Run the TUI application.
    pub async fn run(&mut self) -> Result<()> {
        self.start_receiving().await;
        // failures arrive as DiscoveryFailed on the status feed
        let _ = self.coordinator.start_discovery().await;

        let tick_rate = Duration::from_millis(250);

        loop {
            self.poll_status();

            self.draw()?;

            if let Ok(Some(event)) = tokio::time::timeout(tick_rate, self.events.next()).await {
                self.handle_event(&event).await;
            }

            if self.should_quit {
                break;
            }
        }

        self.coordinator.shutdown().await;
        Ok(())
    }

    async fn start_receiving(&mut self) {
        if let Err(e) = std::fs::create_dir_all(&self.inbox) {
            self.state.set_status(
                format!("Cannot create {}: {}", self.inbox.display(), e),
                StatusLevel::Error,
            );
            return;
        }

        let policy = Arc::new(UniqueNamePolicy::new(&self.inbox));
        match self.coordinator.start_receiving(policy).await {
            Ok(addr) => {
                tracing::debug!("Receiving on {}", addr);
                self.state.receiving_on = Some(addr);
            }
            Err(e) => {
                self.state
                    .set_status(format!("Receiver error: {e}"), StatusLevel::Error);
            }
        }
    }

    /// Drain the coordinator's status feed into the state.
    fn poll_status(&mut self) {
        loop {
            match self.status_rx.try_recv() {
                Ok(event) => self.state.apply(&event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::debug!("Status feed lagged by {} events", skipped);
                    let snapshot = self.coordinator.peer_snapshot();
                    self.state
                        .resync(snapshot, self.coordinator.is_sending());
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    fn draw(&mut self) -> Result<()> {
        let state = &self.state;
        let theme = &self.theme;

        self.terminal.draw(|frame| {
            let progress_height = if state.is_sending() { 3 } else { 0 };

            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(1),
                    Constraint::Min(3),
                    Constraint::Length(progress_height),
                    Constraint::Length(4),
                ])
                .split(frame.area());

            Self::render_header(frame, chunks[0], state, theme);

            match state.stage {
                Stage::Peers => PeerList::render(frame, chunks[1], state, theme),
                Stage::Files => FileList::render(frame, chunks[1], state, theme),
            }

            if let Some(session) = &state.active_send {
                ProgressDisplay::render(frame, chunks[2], session, theme);
            }

            StatusBar::render(frame, chunks[3], state, theme);
        })?;

        Ok(())
    }

    /// Render the header bar.
    fn render_header(frame: &mut ratatui::Frame, area: Rect, state: &AppState, theme: &Theme) {
        let mut spans = vec![Span::styled(
            format!(" p2pshare v{} ", p2pshare_core::VERSION),
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD),
        )];

        match state.receiving_on {
            Some(addr) => spans.push(Span::styled(
                format!(" receiving on {addr} "),
                Style::default().fg(theme.text_secondary),
            )),
            None => spans.push(Span::styled(
                " not receiving ",
                Style::default().fg(theme.warning),
            )),
        }

        frame.render_widget(Paragraph::new(Line::from(spans)), area);
    }

    /// Handle a terminal event.
    async fn handle_event(&mut self, event: &Event) {
        if let Event::Key(key) = event {
            let action = map_key_event(*key, &self.state);
            self.handle_action(action).await;
        }
    }

    async fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => {
                self.events.cancel();
                self.should_quit = true;
            }
            Action::Up => self.state.move_up(),
            Action::Down => self.state.move_down(),
            Action::Select => match self.state.stage {
                Stage::Peers => {
                    self.state.choose_peer();
                }
                Stage::Files => self.send_selected().await,
            },
            Action::Back => self.state.back(),
            Action::Rescan => self.rescan().await,
            Action::CancelSend => {
                if self.coordinator.cancel_send().await {
                    self.state.set_status("Cancelling send...", StatusLevel::Progress);
                }
            }
            Action::None => {}
        }
    }

    async fn send_selected(&mut self) {
        if self.state.is_sending() || self.coordinator.is_sending() {
            self.state
                .set_status("A send is already in progress", StatusLevel::Error);
            return;
        }

        let (Some(peer), Some(file)) = (self.state.target.clone(), self.state.selected_file())
        else {
            return;
        };
        let path = file.path.clone();

        match self.coordinator.send_file(&path, &peer).await {
            Ok(id) => tracing::debug!("Started send {} of {}", id, path.display()),
            Err(Error::Busy) => {
                self.state
                    .set_status("A send is already in progress", StatusLevel::Error);
            }
            Err(e) => {
                self.state
                    .set_status(format!("Send failed: {e}"), StatusLevel::Error);
            }
        }
    }

    async fn rescan(&mut self) {
        self.coordinator.stop_discovery().await;
        self.state.discovery_available = true;
        self.state.set_status("Rescanning...", StatusLevel::Info);
        let _ = self.coordinator.start_discovery().await;

        match load_files(&self.dir) {
            Ok(files) => self.state.set_files(files),
            Err(e) => self.state.set_status(
                format!("Cannot list {}: {}", self.dir.display(), e),
                StatusLevel::Error,
            ),
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.events.cancel();
        let _ = disable_raw_mode();
        let _ = self.terminal.backend_mut().execute(LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}
