//! Keys and the one-line message editor

use super::theme::Theme;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Style,
    widgets::{Block, Borders, Paragraph, Widget},
};
use unicode_width::UnicodeWidthChar;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Char(char),
    Submit,
    Backspace,
    Delete,
    Left,
    Right,
    Up,
    Down,
    Home,
    End,
    PageUp,
    PageDown,
    Escape,
    /// Cancels the running turn, or quits when idle
    Interrupt,
    ClearLine,
    DeleteWord,
    Paste(String),
    Quit,
    NewThread,
    AgentSelect,
    ModelSelect,
    Unknown,
}

pub fn key_to_action(event: KeyEvent) -> Action {
    let ctrl = event.modifiers.contains(KeyModifiers::CONTROL);
    let alt = event.modifiers.contains(KeyModifiers::ALT);
    match (event.code, ctrl, alt) {
        (KeyCode::Char(c), true, _) => match c {
            'c' => Action::Interrupt,
            'u' => Action::ClearLine,
            'w' => Action::DeleteWord,
            'q' => Action::Quit,
            'n' => Action::NewThread,
            'g' => Action::AgentSelect,
            'k' => Action::ModelSelect,
            _ => Action::Unknown,
        },
        (_, true, _) | (_, _, true) => Action::Unknown,
        (KeyCode::Char(c), ..) => Action::Char(c),
        (KeyCode::Enter, ..) => Action::Submit,
        (KeyCode::Backspace, ..) => Action::Backspace,
        (KeyCode::Delete, ..) => Action::Delete,
        (KeyCode::Left, ..) => Action::Left,
        (KeyCode::Right, ..) => Action::Right,
        (KeyCode::Up, ..) => Action::Up,
        (KeyCode::Down, ..) => Action::Down,
        (KeyCode::Home, ..) => Action::Home,
        (KeyCode::End, ..) => Action::End,
        (KeyCode::PageUp, ..) => Action::PageUp,
        (KeyCode::PageDown, ..) => Action::PageDown,
        (KeyCode::Esc, ..) => Action::Escape,
        _ => Action::Unknown,
    }
}

fn char_width(c: char) -> usize {
    c.width().unwrap_or(0)
}

/// Message being composed. Pasted newlines collapse to spaces.
#[derive(Debug, Default)]
pub struct InputBox {
    chars: Vec<char>,
    /// Index into `chars`
    cursor: usize,
    /// Columns scrolled off the left edge
    offset: usize,
    placeholder: String,
}

impl InputBox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.placeholder = placeholder.into();
        self
    }

    pub fn content(&self) -> String {
        self.chars.iter().collect()
    }

    pub fn clear(&mut self) {
        self.chars.clear();
        self.cursor = 0;
        self.offset = 0;
    }

    fn cursor_column(&self) -> usize {
        self.chars[..self.cursor].iter().copied().map(char_width).sum()
    }

    fn insert(&mut self, c: char) {
        self.chars.insert(self.cursor, c);
        self.cursor += 1;
    }

    fn delete_word(&mut self) {
        let mut start = self.cursor;
        while start > 0 && self.chars[start - 1] == ' ' {
            start -= 1;
        }
        while start > 0 && self.chars[start - 1] != ' ' {
            start -= 1;
        }
        self.chars.drain(start..self.cursor);
        self.cursor = start;
    }

    fn paste(&mut self, text: &str) {
        for c in text.chars() {
            if c != '\n' && c != '\r' {
                self.insert(c);
            } else if self.cursor > 0 && self.chars.last() != Some(&' ') {
                self.insert(' ');
            }
        }
    }

    /// Apply an editing action; false when it changes nothing
    pub fn handle_action(&mut self, action: &Action, width: u16) -> bool {
        let len = self.chars.len();
        match action {
            Action::Char(c) => self.insert(*c),
            Action::Backspace if self.cursor > 0 => {
                self.cursor -= 1;
                self.chars.remove(self.cursor);
            }
            Action::Delete if self.cursor < len => {
                self.chars.remove(self.cursor);
            }
            Action::Left if self.cursor > 0 => self.cursor -= 1,
            Action::Right if self.cursor < len => self.cursor += 1,
            Action::Home => self.cursor = 0,
            Action::End => self.cursor = len,
            Action::ClearLine => self.clear(),
            Action::DeleteWord => self.delete_word(),
            Action::Paste(text) => self.paste(text),
            _ => return false,
        }
        self.keep_cursor_visible(width.saturating_sub(4) as usize);
        true
    }

    fn keep_cursor_visible(&mut self, visible: usize) {
        let column = self.cursor_column();
        if column < self.offset {
            self.offset = column;
        } else if column >= self.offset + visible {
            self.offset = column + 1 - visible.max(1);
        }
    }

    pub fn render(&self, area: Rect, buf: &mut Buffer, theme: &Theme, focused: bool) {
        let border = if focused { theme.highlight() } else { theme.frame() };
        let block = Block::default().borders(Borders::ALL).border_style(border);
        let inner = block.inner(area);
        block.render(area, buf);

        if self.chars.is_empty() {
            Paragraph::new(self.placeholder.as_str())
                .style(theme.muted())
                .render(inner, buf);
        } else {
            let mut column = 0;
            let mut shown = String::new();
            for &c in &self.chars {
                let w = char_width(c);
                if column >= self.offset {
                    if column - self.offset + w > inner.width as usize {
                        break;
                    }
                    shown.push(c);
                }
                column += w;
            }
            Paragraph::new(shown).style(theme.text()).render(inner, buf);
        }

        if !focused || inner.width == 0 {
            return;
        }
        let x = self.cursor_column().saturating_sub(self.offset);
        if x < inner.width as usize {
            if let Some(cell) = buf.cell_mut((inner.x + x as u16, inner.y)) {
                cell.set_style(Style::default().bg(theme.accent));
            }
        }
    }
}
