use ratatui::style::{Color, Modifier, Style};

/// Palette for the transcript, input box and selector
#[derive(Debug, Clone)]
pub struct Theme {
    pub bg: Color,
    pub fg: Color,
    pub muted: Color,
    /// Prompt, user headings and the selection bar
    pub accent: Color,
    pub failure: Color,
    /// Agent headings and finished tasks
    pub ok: Color,
    /// Warnings, cancellation and unmatched tool output
    pub caution: Color,
    pub frame: Color,
    /// Tool calls and inline code
    pub tool: Color,
    pub link: Color,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            bg: Color::Reset,
            fg: Color::White,
            muted: Color::DarkGray,
            accent: Color::Cyan,
            failure: Color::Red,
            ok: Color::Green,
            caution: Color::Yellow,
            frame: Color::DarkGray,
            tool: Color::Magenta,
            link: Color::Blue,
        }
    }

    fn fg(color: Color) -> Style {
        Style::default().fg(color)
    }

    pub fn text(&self) -> Style {
        Self::fg(self.fg).bg(self.bg)
    }

    pub fn muted(&self) -> Style {
        Self::fg(self.muted)
    }

    pub fn highlight(&self) -> Style {
        Self::fg(self.accent)
    }

    pub fn heading(&self) -> Style {
        self.highlight().add_modifier(Modifier::BOLD)
    }

    pub fn failure(&self) -> Style {
        Self::fg(self.failure)
    }

    pub fn ok(&self) -> Style {
        Self::fg(self.ok)
    }

    pub fn caution(&self) -> Style {
        Self::fg(self.caution)
    }

    pub fn tool(&self) -> Style {
        Self::fg(self.tool)
    }

    pub fn frame(&self) -> Style {
        Self::fg(self.frame)
    }
}
