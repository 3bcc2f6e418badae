//! Markdown rendering for AI answers
//!
//! Lines come back already wrapped to the requested width, so the caller can
//! count rows without a second layout pass.

use super::theme::Theme;
use pulldown_cmark::{Event, HeadingLevel, Parser, Tag, TagEnd};
use ratatui::{
    style::{Modifier, Style},
    text::{Line, Span},
};
use unicode_width::UnicodeWidthStr;

/// Convert markdown text to styled lines no wider than `width`
pub fn render_markdown(text: &str, theme: &Theme, width: usize) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut lines: Vec<Line<'static>> = Vec::new();
    let mut current: Vec<Span<'static>> = Vec::new();
    let mut style = theme.text();
    let mut in_code_block = false;
    let mut code_block = String::new();
    let mut list_depth: usize = 0;

    let flush = |current: &mut Vec<Span<'static>>, lines: &mut Vec<Line<'static>>| {
        if !current.is_empty() {
            lines.extend(wrap_spans(std::mem::take(current), width));
        }
    };

    for event in Parser::new(text) {
        match event {
            Event::Start(tag) => match tag {
                Tag::Heading { level, .. } => {
                    flush(&mut current, &mut lines);
                    style = match level {
                        HeadingLevel::H1 => theme
                            .highlight()
                            .add_modifier(Modifier::BOLD | Modifier::UNDERLINED),
                        HeadingLevel::H2 => theme.heading(),
                        _ => theme.highlight(),
                    };
                }
                Tag::Paragraph => flush(&mut current, &mut lines),
                Tag::CodeBlock(_) => {
                    flush(&mut current, &mut lines);
                    in_code_block = true;
                    code_block.clear();
                }
                Tag::List(_) => list_depth += 1,
                Tag::Item => {
                    flush(&mut current, &mut lines);
                    let indent = "  ".repeat(list_depth.saturating_sub(1));
                    current.push(Span::styled(format!("{}• ", indent), theme.muted()));
                }
                Tag::Emphasis => style = style.add_modifier(Modifier::ITALIC),
                Tag::Strong => style = style.add_modifier(Modifier::BOLD),
                Tag::Strikethrough => style = style.add_modifier(Modifier::CROSSED_OUT),
                Tag::Link { .. } => style = Style::default().fg(theme.link),
                _ => {}
            },
            Event::End(tag_end) => match tag_end {
                TagEnd::Heading(_) => {
                    flush(&mut current, &mut lines);
                    style = theme.text();
                }
                TagEnd::Paragraph => {
                    flush(&mut current, &mut lines);
                    lines.push(Line::from(""));
                }
                TagEnd::CodeBlock => {
                    in_code_block = false;
                    let code_style = Style::default().fg(theme.tool).add_modifier(Modifier::DIM);
                    for code_line in code_block.lines() {
                        let shown = clip(code_line, width.saturating_sub(2));
                        lines.push(Line::from(Span::styled(format!("  {}", shown), code_style)));
                    }
                    lines.push(Line::from(""));
                }
                TagEnd::List(_) => {
                    list_depth = list_depth.saturating_sub(1);
                    if list_depth == 0 {
                        lines.push(Line::from(""));
                    }
                }
                TagEnd::Item => flush(&mut current, &mut lines),
                TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link => {
                    style = theme.text();
                }
                _ => {}
            },
            Event::Text(text) => {
                if in_code_block {
                    code_block.push_str(&text);
                } else {
                    current.push(Span::styled(text.into_string(), style));
                }
            }
            Event::Code(code) => {
                let code_style = Style::default().fg(theme.tool).add_modifier(Modifier::BOLD);
                current.push(Span::styled(format!("`{}`", code), code_style));
            }
            Event::SoftBreak => current.push(Span::raw(" ")),
            Event::HardBreak => flush(&mut current, &mut lines),
            _ => {}
        }
    }
    flush(&mut current, &mut lines);

    while lines.last().is_some_and(|l| l.width() == 0) {
        lines.pop();
    }
    lines
}

/// Break styled spans into lines of at most `width` columns, at spaces where possible
pub fn wrap_spans(spans: Vec<Span<'static>>, width: usize) -> Vec<Line<'static>> {
    let width = width.max(1);
    let mut lines = Vec::new();
    let mut line: Vec<Span<'static>> = Vec::new();
    let mut used = 0;

    for span in spans {
        let style = span.style;
        for word in span.content.split_inclusive(' ') {
            let mut word = word.to_string();
            loop {
                let w = word.width();
                if used + w <= width {
                    used += w;
                    line.push(Span::styled(word, style));
                    break;
                }
                if used > 0 && w <= width {
                    lines.push(Line::from(std::mem::take(&mut line)));
                    used = 0;
                    continue;
                }
                // Longer than a whole line: hard split
                let mut head = clip(&word, width - used);
                if head.is_empty() {
                    if used > 0 {
                        lines.push(Line::from(std::mem::take(&mut line)));
                        used = 0;
                        continue;
                    }
                    // A single character wider than the line
                    head = word.chars().next().map(String::from).unwrap_or_default();
                }
                let rest = word[head.len()..].to_string();
                line.push(Span::styled(head, style));
                lines.push(Line::from(std::mem::take(&mut line)));
                used = 0;
                if rest.is_empty() {
                    break;
                }
                word = rest;
            }
        }
    }
    if !line.is_empty() {
        lines.push(Line::from(line));
    }
    lines
}

/// Longest prefix of `text` that fits in `width` columns
fn clip(text: &str, width: usize) -> String {
    let mut used = 0;
    text.chars()
        .take_while(|c| {
            used += c.to_string().width();
            used <= width
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_of(line: &Line) -> String {
        line.spans.iter().map(|s| s.content.as_ref()).collect()
    }

    #[test]
    fn test_simple_text() {
        let lines = render_markdown("Hello, **world**!", &Theme::dark(), 80);
        assert_eq!(lines.len(), 1);
        assert_eq!(text_of(&lines[0]), "Hello, world!");
    }

    #[test]
    fn test_headings_use_accent() {
        let theme = Theme::dark();
        let lines = render_markdown("# Results\n\nplain", &theme, 80);
        assert_eq!(text_of(&lines[0]), "Results");
        let title = lines[0].spans[0].style;
        assert_eq!(title.fg, Some(theme.accent));
        assert!(title.add_modifier.contains(Modifier::UNDERLINED));

        let body = lines.last().unwrap();
        assert_eq!(text_of(body), "plain");
        assert_eq!(body.spans[0].style.fg, Some(theme.fg));
    }

    #[test]
    fn test_code_block_clipped() {
        let md = "```\nlet answer = 2 + 2;\n```";
        let lines = render_markdown(md, &Theme::dark(), 10);
        assert_eq!(text_of(&lines[0]), "  let answ");
    }

    #[test]
    fn test_lines_fit_width() {
        let md = "The answer to two plus two is four, which a calculator confirmed.\n\n- first point\n- second";
        for line in render_markdown(md, &Theme::dark(), 12) {
            assert!(line.width() <= 12, "too wide: {:?}", text_of(&line));
        }
    }

    #[test]
    fn test_wrap_splits_long_words() {
        let lines = wrap_spans(vec![Span::raw("abcdefghij")], 4);
        let texts: Vec<String> = lines.iter().map(text_of).collect();
        assert_eq!(texts, vec!["abcd", "efgh", "ij"]);
    }
}
