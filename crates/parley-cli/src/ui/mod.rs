//! TUI implementation for parley

mod input;
mod markdown;
mod selector;
mod theme;
mod view;

pub use view::truncate_chars;

use crossterm::event::{Event, EventStream, MouseEventKind};
use futures::StreamExt;
use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
};
use std::time::Instant;

use crate::client::UnitStream;
use crate::commands::execute_command;
use crate::session::{CommandOutcome, Session};
use input::{Action, InputBox, key_to_action};
use selector::{SelectorItem, SelectorKind, SelectorState, render_selector};
use theme::Theme;
use view::{TranscriptView, Viewport, spinner_frame};

/// What the event loop should do after an action
#[derive(Debug, PartialEq)]
enum Next {
    Continue,
    /// Send this text as a new turn
    Submit(String),
    /// Run a slash command
    Command(String),
    /// Drop the running turn
    Cancel,
    Quit,
}

/// TUI application state
pub struct TuiState {
    session: Session,
    input: InputBox,
    /// First visible line; `usize::MAX` follows the bottom
    scroll: usize,
    is_processing: bool,
    status: String,
    theme: Theme,
    spinner_start: Instant,
    selector: SelectorState,
}

impl TuiState {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            input: InputBox::new().with_placeholder("Type a message or /help..."),
            scroll: usize::MAX,
            is_processing: false,
            status: "Ready".to_string(),
            theme: Theme::dark(),
            spinner_start: Instant::now(),
            selector: SelectorState::default(),
        }
    }

    fn scroll_to_bottom(&mut self) {
        self.scroll = usize::MAX;
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.session.transcript.push_notice(text);
        self.scroll_to_bottom();
    }

    fn selector_items(&self, kind: SelectorKind) -> Vec<SelectorItem> {
        let Some(info) = self.session.client.info() else {
            return vec![];
        };
        match kind {
            SelectorKind::Agent => info
                .agents
                .iter()
                .map(|a| SelectorItem {
                    label: a.key.clone(),
                    description: Some(a.description.clone()),
                    is_current: a.key == self.session.client.agent(),
                })
                .collect(),
            SelectorKind::Model => info
                .models
                .iter()
                .map(|m| SelectorItem {
                    label: m.clone(),
                    description: None,
                    is_current: m == self.session.model_label(),
                })
                .collect(),
        }
    }

    fn open_selector(&mut self, kind: SelectorKind) {
        let items = self.selector_items(kind);
        if items.is_empty() {
            self.notice("Not connected to an agent host");
            return;
        }
        let current = items.iter().position(|i| i.is_current).unwrap_or(0);
        self.selector.show(kind, current);
    }

    /// Keys while a selector popup is open
    async fn handle_selector(&mut self, kind: SelectorKind, action: Action) {
        let count = self.selector_items(kind).len();
        match action {
            Action::Up => self.selector.up(count),
            Action::Down => self.selector.down(count),
            Action::Submit => {
                let chosen = self
                    .selector_items(kind)
                    .into_iter()
                    .nth(self.selector.selected)
                    .map(|i| i.label);
                self.selector.hide();
                if let Some(label) = chosen {
                    let command = match kind {
                        SelectorKind::Agent => format!("/agent {}", label),
                        SelectorKind::Model => format!("/model {}", label),
                    };
                    self.run_command(&command).await;
                }
            }
            Action::Escape | Action::Interrupt => self.selector.hide(),
            _ => {}
        }
    }

    /// Map a key action to the next step of the event loop
    fn handle_action(&mut self, action: Action, width: u16) -> Next {
        match action {
            Action::Submit => {
                let content = self.input.content().trim().to_string();
                if content.is_empty() || self.is_processing {
                    return Next::Continue;
                }
                self.input.clear();
                if content.starts_with('/') {
                    Next::Command(content)
                } else {
                    Next::Submit(content)
                }
            }
            Action::Quit => Next::Quit,
            Action::Interrupt | Action::Escape => {
                if self.is_processing {
                    self.status = "Cancelling...".to_string();
                    Next::Cancel
                } else if action == Action::Escape && !self.input.content().is_empty() {
                    self.input.clear();
                    Next::Continue
                } else {
                    Next::Quit
                }
            }
            Action::PageUp => {
                self.scroll = self.scroll.saturating_sub(10);
                Next::Continue
            }
            Action::PageDown => {
                self.scroll = self.scroll.saturating_add(10);
                Next::Continue
            }
            Action::NewThread if !self.is_processing => Next::Command("/new".to_string()),
            Action::AgentSelect if !self.is_processing => {
                self.open_selector(SelectorKind::Agent);
                Next::Continue
            }
            Action::ModelSelect if !self.is_processing => {
                self.open_selector(SelectorKind::Model);
                Next::Continue
            }
            _ => {
                self.input.handle_action(&action, width);
                Next::Continue
            }
        }
    }

    /// Run a slash command; false when it asks to exit
    async fn run_command(&mut self, command: &str) -> bool {
        let Some(result) = execute_command(command, &self.session.context()) else {
            return true;
        };
        match self.session.apply_command(result).await {
            CommandOutcome::Notice(text) => self.notice(text),
            CommandOutcome::OpenAgentSelector => self.open_selector(SelectorKind::Agent),
            CommandOutcome::OpenModelSelector => self.open_selector(SelectorKind::Model),
            CommandOutcome::Exit => return false,
        }
        self.status = "Ready".to_string();
        true
    }

    fn start_turn(&mut self, content: &str) -> Option<UnitStream> {
        self.scroll_to_bottom();
        match self.session.start_turn(content) {
            Ok(stream) => {
                self.is_processing = true;
                self.spinner_start = Instant::now();
                self.status = "Thinking...".to_string();
                Some(stream)
            }
            Err(e) => {
                self.session.transcript.push_warning(e.to_string());
                None
            }
        }
    }

    fn end_turn(&mut self) {
        self.is_processing = false;
        self.status = match self.session.transcript.open_tool_calls() {
            0 => "Ready".to_string(),
            n => format!("Ready | {} tool call(s) without result", n),
        };
    }

    fn mouse_scroll(&mut self, kind: MouseEventKind) {
        match kind {
            MouseEventKind::ScrollUp => self.scroll = self.scroll.saturating_sub(3),
            MouseEventKind::ScrollDown => self.scroll = self.scroll.saturating_add(3),
            _ => {}
        }
    }

    /// Render the UI
    pub fn render(&mut self, frame: &mut Frame) {
        let size = frame.area();

        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(1),    // Transcript
                Constraint::Length(1), // Status
                Constraint::Length(3), // Input
            ])
            .split(size);

        self.render_transcript(frame, chunks[0]);
        self.render_status(frame, chunks[1]);
        let focused = self.selector.open.is_none();
        self.input
            .render(chunks[2], frame.buffer_mut(), &self.theme, focused);

        if let Some(kind) = self.selector.open {
            let items = self.selector_items(kind);
            render_selector(
                kind.title(),
                &items,
                self.selector.selected,
                &self.theme,
                size,
                frame.buffer_mut(),
            );
        }
    }

    fn render_transcript(&mut self, frame: &mut Frame, area: Rect) {
        let title = format!(
            " parley │ {} │ {} ",
            self.session.client.agent(),
            self.session.model_label()
        );
        let block = Block::default()
            .borders(Borders::ALL)
            .border_style(self.theme.frame())
            .title(title);

        let inner = block.inner(area);
        frame.render_widget(block, area);

        if inner.height == 0 || self.session.transcript.is_empty() {
            frame.render_widget(self.welcome(), inner);
            return;
        }

        // Leave a column for the scrollbar
        let width = inner.width.saturating_sub(1) as usize;
        let view = TranscriptView::new(&self.theme, self.session.client.agent(), self.spinner_start);
        let lines = view.lines(self.session.transcript.entries(), width);
        let height = lines.len();
        let max_scroll = height.saturating_sub(inner.height as usize);
        self.scroll = self.scroll.min(max_scroll);

        frame.render_widget(Viewport::new(&lines, self.scroll), inner);

        if height > inner.height as usize {
            let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .begin_symbol(Some("↑"))
                .end_symbol(Some("↓"))
                .track_symbol(Some("│"))
                .thumb_symbol("█");
            let mut state = ScrollbarState::new(max_scroll).position(self.scroll);
            frame.render_stateful_widget(scrollbar, inner, &mut state);
        }
    }

    fn welcome(&self) -> Paragraph<'static> {
        let key = |k: &'static str, what: &'static str| {
            Line::from(vec![
                Span::styled(format!("    {:<10}", k), Style::default().fg(Color::Cyan)),
                Span::styled(what, Style::default().fg(Color::White)),
            ])
        };
        Paragraph::new(vec![
            Line::from(""),
            Line::from(vec![
                Span::styled(
                    "  parley",
                    Style::default()
                        .fg(Color::White)
                        .add_modifier(Modifier::BOLD),
                ),
                Span::styled(
                    format!(" - {}", self.session.client.base_url()),
                    Style::default().fg(Color::DarkGray),
                ),
            ]),
            Line::from(Span::styled(
                format!("  Thread: {}", self.session.thread_id),
                Style::default().fg(Color::DarkGray),
            )),
            Line::from(""),
            Line::from(Span::styled("  Keybindings", Style::default().fg(Color::Yellow))),
            Line::from(""),
            key("Enter", "Send message"),
            key("Ctrl+G", "Select agent"),
            key("Ctrl+K", "Select model"),
            key("Ctrl+N", "New thread"),
            key("Ctrl+C", "Cancel / Quit"),
            key("PgUp/Dn", "Scroll transcript"),
            Line::from(""),
            Line::from(Span::styled(
                "  Type a message to get started...",
                Style::default().fg(Color::DarkGray),
            )),
        ])
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        if self.is_processing {
            let status = if self.session.transcript.is_streaming() {
                "Streaming..."
            } else {
                self.status.as_str()
            };
            let text = format!("{} {}", spinner_frame(self.spinner_start), status);
            frame.render_widget(Paragraph::new(Span::styled(text, self.theme.highlight())), area);
            return;
        }

        let tokens = if self.session.stream_tokens { "tokens on" } else { "tokens off" };
        let left = format!("{} │ {}", tokens, self.status);
        let right = "Ctrl+G: agent │ Ctrl+K: model │ Ctrl+C: quit";
        let left_width = left.chars().count();
        let right_width = right.chars().count();
        let available = area.width as usize;

        let line = if left_width + right_width + 2 <= available {
            Line::from(vec![
                Span::styled(left, self.theme.muted()),
                Span::raw(" ".repeat(available - left_width - right_width)),
                Span::styled(right, Style::default().fg(Color::DarkGray)),
            ])
        } else {
            Line::from(Span::styled(left, self.theme.muted()))
        };
        frame.render_widget(Paragraph::new(line), area);
    }
}

/// Run the TUI application
pub async fn run_tui(session: Session) -> anyhow::Result<()> {
    use crossterm::{
        event::{DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture},
        execute,
        terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
    };
    use ratatui::{Terminal, backend::CrosstermBackend};
    use std::io;

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut state = TuiState::new(session);
    let mut events = EventStream::new();
    // Tick interval for animations (80ms for smooth spinner)
    let mut tick = tokio::time::interval(std::time::Duration::from_millis(80));
    let mut turn: Option<UnitStream> = None;

    let result: anyhow::Result<()> = loop {
        terminal.draw(|frame| state.render(frame))?;
        let width = terminal.size()?.width;

        tokio::select! {
            biased;

            // Stream units first so tokens render as they arrive
            item = next_unit(&mut turn) => {
                let done = match item {
                    Some(item) => state.session.apply_unit(item),
                    None => {
                        state.session.transcript.finish();
                        true
                    }
                };
                state.scroll_to_bottom();
                if done {
                    turn = None;
                    state.end_turn();
                }
            }

            event = events.next() => {
                let action = match event {
                    Some(Ok(Event::Key(key))) => key_to_action(key),
                    Some(Ok(Event::Paste(text))) => Action::Paste(text),
                    Some(Ok(Event::Mouse(mouse))) => {
                        state.mouse_scroll(mouse.kind);
                        continue;
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break Err(anyhow::anyhow!("Event error: {}", e)),
                    None => break Ok(()),
                };

                if let Some(kind) = state.selector.open {
                    state.handle_selector(kind, action).await;
                    continue;
                }

                match state.handle_action(action, width) {
                    Next::Continue => {}
                    Next::Submit(content) => turn = state.start_turn(&content),
                    Next::Command(command) => {
                        if !state.run_command(&command).await {
                            break Ok(());
                        }
                    }
                    Next::Cancel => {
                        turn = None;
                        state.session.cancel_turn();
                        state.end_turn();
                    }
                    Next::Quit => break Ok(()),
                }
            }

            _ = tick.tick() => {}
        }
    };

    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;

    result
}

/// Next item of the running turn; pending forever when idle
async fn next_unit(
    turn: &mut Option<UnitStream>,
) -> Option<crate::client::Result<parley_schema::StreamUnit>> {
    match turn {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}
