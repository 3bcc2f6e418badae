//! Popup for picking an agent or a model

use super::theme::Theme;
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, HighlightSpacing, List, ListItem, ListState, StatefulWidget, Widget},
};

const MAX_POPUP_WIDTH: u16 = 80;

pub struct SelectorItem {
    pub label: String,
    pub description: Option<String>,
    /// Whether this item is currently active
    pub is_current: bool,
}

/// Which list the popup is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Agent,
    Model,
}

impl SelectorKind {
    pub fn title(self) -> &'static str {
        match self {
            SelectorKind::Agent => "Select Agent",
            SelectorKind::Model => "Select Model",
        }
    }
}

/// State for the selector popup
#[derive(Debug, Default)]
pub struct SelectorState {
    pub selected: usize,
    /// The open popup, if any
    pub open: Option<SelectorKind>,
}

impl SelectorState {
    pub fn show(&mut self, kind: SelectorKind, selected: usize) {
        self.open = Some(kind);
        self.selected = selected;
    }

    pub fn hide(&mut self) {
        self.open = None;
    }

    /// Move selection up, wrapping around
    pub fn up(&mut self, item_count: usize) {
        if item_count == 0 {
            return;
        }
        self.selected = if self.selected > 0 {
            self.selected - 1
        } else {
            item_count - 1
        };
    }

    /// Move selection down, wrapping around
    pub fn down(&mut self, item_count: usize) {
        if item_count == 0 {
            return;
        }
        self.selected = (self.selected + 1) % item_count;
    }
}

/// Render the popup centered in `area`
pub fn render_selector(
    title: &str,
    items: &[SelectorItem],
    selected: usize,
    theme: &Theme,
    area: Rect,
    buf: &mut Buffer,
) {
    let mut max_width = title.len() + 4;
    for item in items {
        let desc = item.description.as_ref().map_or(0, |d| d.len() + 2);
        max_width = max_width.max(item.label.len() + desc + 6);
    }
    let width = (max_width as u16).clamp(20, MAX_POPUP_WIDTH);
    let height = (items.len() as u16 + 2).min(20);

    let x = area.x + area.width.saturating_sub(width) / 2;
    let y = area.y + area.height.saturating_sub(height) / 2;
    let popup = Rect::new(x, y, width.min(area.width), height.min(area.height));
    Clear.render(popup, buf);

    let list_items: Vec<ListItem> = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let prefix = if item.is_current { "● " } else { "  " };
            let style = if i == selected {
                Style::default()
                    .bg(theme.accent)
                    .fg(theme.bg)
                    .add_modifier(Modifier::BOLD)
            } else if item.is_current {
                theme.highlight()
            } else {
                theme.text()
            };
            let mut spans = vec![Span::styled(format!("{}{}", prefix, item.label), style)];
            if let Some(desc) = &item.description {
                spans.push(Span::styled(format!("  {}", desc), theme.muted()));
            }
            ListItem::new(Line::from(spans))
        })
        .collect();

    let block = Block::default()
        .title(format!(" {} ", title))
        .title_style(theme.heading())
        .borders(Borders::ALL)
        .border_style(theme.highlight());
    let list = List::new(list_items)
        .block(block)
        .highlight_spacing(HighlightSpacing::Always);

    let mut state = ListState::default();
    state.select(Some(selected));
    StatefulWidget::render(list, popup, buf, &mut state);
}
