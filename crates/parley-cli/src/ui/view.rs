//! Turning transcript entries into terminal lines

use super::markdown::{render_markdown, wrap_spans};
use super::theme::Theme;
use crate::transcript::{Entry, ToolSlot};
use parley_schema::{ChatMessage, TaskData, TaskState};
use ratatui::{
    buffer::Buffer,
    layout::Rect,
    style::Modifier,
    text::{Line, Span},
    widgets::Widget,
};
use std::time::{Duration, Instant};

const SPINNER_FRAMES: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];

/// Tool output shown under a call is cut to this many characters
const TOOL_PREVIEW_CHARS: usize = 200;

pub fn spinner_frame(start: Instant) -> &'static str {
    let index = (start.elapsed().as_millis() / Duration::from_millis(80).as_millis()) as usize;
    SPINNER_FRAMES[index % SPINNER_FRAMES.len()]
}

/// Truncate to `max` characters, appending "..." if anything was cut
pub fn truncate_chars(s: &str, max: usize) -> String {
    let mut chars = s.chars();
    let truncated: String = chars.by_ref().take(max).collect();
    if chars.next().is_some() {
        format!("{}...", truncated)
    } else {
        truncated
    }
}

/// Renders transcript entries; `agent` labels AI blocks
pub struct TranscriptView<'a> {
    theme: &'a Theme,
    agent: &'a str,
    spinner: &'static str,
}

impl<'a> TranscriptView<'a> {
    pub fn new(theme: &'a Theme, agent: &'a str, spinner_start: Instant) -> Self {
        Self {
            theme,
            agent,
            spinner: spinner_frame(spinner_start),
        }
    }

    /// Every line of the transcript, wrapped to `width`
    pub fn lines(&self, entries: &[Entry], width: usize) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for entry in entries {
            lines.extend(self.entry_lines(entry, width));
            lines.push(Line::from(""));
        }
        lines
    }

    fn entry_lines(&self, entry: &Entry, width: usize) -> Vec<Line<'static>> {
        let theme = self.theme;
        let body = width.saturating_sub(2);
        match entry {
            Entry::Human(message) => {
                let mut lines = vec![header("▶ You".into(), theme.heading())];
                lines.extend(self.plain(&message.content, body, theme.text()));
                lines
            }
            Entry::Ai { message, tools } => {
                let mut lines = vec![self.ai_header(false)];
                if !message.content.is_empty() {
                    lines.extend(indent(render_markdown(&message.content, theme, body)));
                }
                for slot in tools {
                    lines.extend(self.tool_slot(slot, body));
                }
                lines
            }
            Entry::Streaming { text, .. } => {
                let mut lines = vec![self.ai_header(true)];
                if text.is_empty() {
                    lines.push(Line::from(Span::styled(
                        format!("  {} thinking...", self.spinner),
                        theme.caution(),
                    )));
                } else {
                    lines.extend(indent(render_markdown(text, theme, body)));
                }
                lines
            }
            Entry::Tool { message, unmatched } => {
                let name = message.name.clone().unwrap_or_else(|| "tool".to_string());
                let mut title = vec![Span::styled(format!("⚙ {}", name), theme.tool())];
                if *unmatched {
                    title.push(Span::styled(
                        " (unmatched)",
                        theme.caution().add_modifier(Modifier::BOLD),
                    ));
                }
                let mut lines = vec![Line::from(title)];
                lines.extend(self.plain(&message.content, body, theme.muted()));
                lines
            }
            Entry::Task { task, .. } => self.task(task, body),
            Entry::Warning(text) => self.plain(&format!("⚠ {}", text), body, theme.caution()),
            Entry::Notice(text) => {
                let mut lines = vec![header("● System".into(), theme.muted())];
                lines.extend(self.plain(text, body, theme.muted()));
                lines
            }
        }
    }

    fn ai_header(&self, streaming: bool) -> Line<'static> {
        let cursor = if streaming { " ▌" } else { "" };
        header(
            format!("◀ {}{}", self.agent, cursor),
            self.theme.ok().add_modifier(Modifier::BOLD),
        )
    }

    fn tool_slot(&self, slot: &ToolSlot, width: usize) -> Vec<Line<'static>> {
        let theme = self.theme;
        let call = format!("⚙ {}({})", slot.call.name, slot.call.args);
        let mut lines = indent(wrap_spans(
            vec![Span::styled(truncate_chars(&call, TOOL_PREVIEW_CHARS), theme.tool())],
            width.saturating_sub(2),
        ));
        match &slot.result {
            Some(result) => lines.extend(self.tool_result(result, width)),
            None => lines.push(Line::from(Span::styled(
                format!("    {} waiting for result", self.spinner),
                theme.muted(),
            ))),
        }
        lines
    }

    fn tool_result(&self, result: &ChatMessage, width: usize) -> Vec<Line<'static>> {
        let preview = truncate_chars(&result.content, TOOL_PREVIEW_CHARS);
        indent(self.plain(&preview, width.saturating_sub(4), self.theme.muted()))
    }

    fn task(&self, task: &TaskData, width: usize) -> Vec<Line<'static>> {
        let theme = self.theme;
        let name = task.name.as_deref().unwrap_or("task");
        let (status, style) = if task.completed_with_error() {
            ("failed".to_string(), theme.failure())
        } else if task.completed() {
            ("done".to_string(), theme.ok())
        } else if task.state == TaskState::Running {
            (format!("{} running", self.spinner), theme.highlight())
        } else {
            ("started".to_string(), theme.muted())
        };
        let mut lines = vec![Line::from(vec![
            Span::styled(format!("◆ {} ", name), theme.tool()),
            Span::styled(status, style),
        ])];
        if !task.data.is_empty() {
            let data = serde_json::Value::Object(task.data.clone()).to_string();
            lines.extend(self.plain(&data, width, theme.muted()));
        }
        lines
    }

    fn plain(&self, text: &str, width: usize, style: ratatui::style::Style) -> Vec<Line<'static>> {
        let mut lines = Vec::new();
        for wrapped in textwrap::wrap(text, width.max(1)) {
            lines.push(Line::from(Span::styled(format!("  {}", wrapped), style)));
        }
        lines
    }
}

fn header(text: String, style: ratatui::style::Style) -> Line<'static> {
    Line::from(Span::styled(text, style))
}

fn indent(lines: Vec<Line<'static>>) -> Vec<Line<'static>> {
    lines
        .into_iter()
        .map(|line| {
            let mut spans = vec![Span::raw("  ")];
            spans.extend(line.spans);
            Line::from(spans)
        })
        .collect()
}

/// A window onto pre-rendered lines
pub struct Viewport<'a> {
    lines: &'a [Line<'static>],
    scroll: usize,
}

impl<'a> Viewport<'a> {
    pub fn new(lines: &'a [Line<'static>], scroll: usize) -> Self {
        Self { lines, scroll }
    }
}

impl Widget for Viewport<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        for (row, line) in self
            .lines
            .iter()
            .skip(self.scroll)
            .take(area.height as usize)
            .enumerate()
        {
            buf.set_line(area.x, area.y + row as u16, line, area.width);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transcript::Transcript;
    use parley_schema::{StreamUnit, ToolCall};

    fn texts(lines: &[Line]) -> Vec<String> {
        lines
            .iter()
            .map(|l| l.spans.iter().map(|s| s.content.as_ref()).collect())
            .collect()
    }

    fn render(transcript: &Transcript) -> Vec<String> {
        let theme = Theme::dark();
        let view = TranscriptView::new(&theme, "research-assistant", Instant::now());
        texts(&view.lines(transcript.entries(), 60))
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("héllo", 2), "hé...");
        assert_eq!(truncate_chars("hi", 5), "hi");
    }

    #[test]
    fn test_tool_call_with_result() {
        let mut transcript = Transcript::new();
        transcript.push_human("2+2?");
        transcript.apply(StreamUnit::message(ChatMessage::ai("").with_tool_calls(vec![ToolCall {
            id: "call_1".into(),
            name: "calculator".into(),
            args: serde_json::json!({"expression": "2+2"}),
        }])));
        transcript.apply(StreamUnit::message(ChatMessage::tool("4", "call_1")));

        let lines = render(&transcript);
        assert_eq!(lines[0], "▶ You");
        assert_eq!(lines[1], "  2+2?");
        assert_eq!(lines[3], "◀ research-assistant");
        assert!(lines[4].contains("⚙ calculator"));
        assert_eq!(lines[5].trim(), "4");
    }

    #[test]
    fn test_unmatched_and_warning() {
        let mut transcript = Transcript::new();
        transcript.apply(StreamUnit::message(ChatMessage::tool("??", "call_9")));
        transcript.apply(StreamUnit::error("Unexpected error"));

        let lines = render(&transcript);
        assert!(lines.iter().any(|l| l.contains("(unmatched)")));
        assert!(lines.iter().any(|l| l == "  ⚠ Unexpected error"));
    }

    #[test]
    fn test_viewport_scrolls() {
        let lines: Vec<Line<'static>> = (0..5).map(|i| Line::from(format!("line {}", i))).collect();
        let area = Rect::new(0, 0, 10, 2);
        let mut buf = Buffer::empty(area);
        Viewport::new(&lines, 3).render(area, &mut buf);
        let row: String = (0..6u16).map(|x| buf[(x, 0u16)].symbol().to_string()).collect();
        assert_eq!(row, "line 3");
    }
}
