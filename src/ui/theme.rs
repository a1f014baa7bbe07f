use ratatui::style::{Color, Modifier, Style};
use supports_color::Stream;

#[derive(Clone, Copy)]
pub struct Palette {
    pub fg: Color,
    pub fg_dim: Color,
    pub fg_strong: Color,
    pub accent: Color,
    pub shortcut: Color,
    pub positive: Color,
    pub highlight: Color,
}

#[derive(Clone, Copy)]
pub struct PanelColors {
    pub border: Color,
    pub border_active: Color,
    pub header_text: Color,
    pub header_text_active: Color,
    pub file_text: Color,
    pub directory_text: Color,
    pub executable_text: Color,
    pub marked_text: Color,
    pub size_pending: Color,
}

#[derive(Clone, Copy)]
pub struct StatusBarColors {
    pub bg: Color,
    pub text: Color,
    pub mode_on: Color,
    pub mode_off: Color,
}

#[derive(Clone, Copy)]
pub struct LegendColors {
    pub key: Color,
    pub label: Color,
}

#[derive(Clone, Copy)]
pub struct OutputColors {
    pub border: Color,
    pub text: Color,
    pub progress: Color,
}

#[derive(Clone, Copy)]
pub struct MessageColors {
    pub text: Color,
}

#[derive(Clone, Copy)]
pub struct Theme {
    pub palette: Palette,
    pub panel: PanelColors,
    pub status_bar: StatusBarColors,
    pub legend: LegendColors,
    pub output: OutputColors,
    pub message: MessageColors,
}

impl Default for Theme {
    fn default() -> Self {
        Self::dark()
    }
}

impl Theme {
    /// Resolve a theme by its settings name, falling back to dark. On
    /// terminals without 256-color support the indexed palettes degrade
    /// to the 16 basic ANSI colors.
    pub fn load(name: &str) -> Self {
        Self::resolve(name, has_256_color())
    }

    fn resolve(name: &str, indexed: bool) -> Self {
        match (name, indexed) {
            ("light", true) => Self::light(),
            ("light", false) => Self::light_ansi(),
            (_, true) => Self::dark(),
            (_, false) => Self::dark_ansi(),
        }
    }

    pub fn dark() -> Self {
        Self::from_palette(
            Palette {
                fg: Color::Indexed(252),
                fg_dim: Color::Indexed(244),
                fg_strong: Color::Indexed(255),
                accent: Color::Indexed(81),
                shortcut: Color::Indexed(214),
                positive: Color::Indexed(114),
                highlight: Color::Indexed(204),
            },
            Color::Indexed(237),
        )
    }

    pub fn light() -> Self {
        Self::from_palette(
            Palette {
                fg: Color::Indexed(236),
                fg_dim: Color::Indexed(246),
                fg_strong: Color::Indexed(232),
                accent: Color::Indexed(26),
                shortcut: Color::Indexed(130),
                positive: Color::Indexed(28),
                highlight: Color::Indexed(161),
            },
            Color::Indexed(253),
        )
    }

    fn dark_ansi() -> Self {
        Self::from_palette(
            Palette {
                fg: Color::Gray,
                fg_dim: Color::DarkGray,
                fg_strong: Color::White,
                accent: Color::Cyan,
                shortcut: Color::Yellow,
                positive: Color::Green,
                highlight: Color::Magenta,
            },
            Color::DarkGray,
        )
    }

    fn light_ansi() -> Self {
        Self::from_palette(
            Palette {
                fg: Color::Black,
                fg_dim: Color::DarkGray,
                fg_strong: Color::Black,
                accent: Color::Blue,
                shortcut: Color::Magenta,
                positive: Color::Green,
                highlight: Color::Red,
            },
            Color::Gray,
        )
    }

    fn from_palette(palette: Palette, status_bg: Color) -> Self {
        Self {
            panel: PanelColors {
                border: palette.fg_dim,
                border_active: palette.accent,
                header_text: palette.fg_dim,
                header_text_active: palette.fg_strong,
                file_text: palette.fg,
                directory_text: palette.accent,
                executable_text: palette.positive,
                marked_text: palette.shortcut,
                size_pending: palette.fg_dim,
            },
            status_bar: StatusBarColors {
                bg: status_bg,
                text: palette.fg,
                mode_on: palette.positive,
                mode_off: palette.fg_dim,
            },
            legend: LegendColors {
                key: palette.shortcut,
                label: palette.fg_dim,
            },
            output: OutputColors {
                border: palette.fg_dim,
                text: palette.fg,
                progress: palette.positive,
            },
            message: MessageColors {
                text: palette.shortcut,
            },
            palette,
        }
    }

    pub fn normal_style(&self) -> Style {
        Style::default().fg(self.panel.file_text)
    }

    pub fn dim_style(&self) -> Style {
        Style::default().fg(self.palette.fg_dim)
    }

    pub fn directory_style(&self) -> Style {
        Style::default()
            .fg(self.panel.directory_text)
            .add_modifier(Modifier::BOLD)
    }

    pub fn executable_style(&self) -> Style {
        Style::default().fg(self.panel.executable_text)
    }

    pub fn marked_style(&self) -> Style {
        Style::default().fg(self.panel.marked_text)
    }

    pub fn border_style(&self, active: bool) -> Style {
        if active {
            Style::default().fg(self.panel.border_active)
        } else {
            Style::default().fg(self.panel.border)
        }
    }

    pub fn status_bar_style(&self) -> Style {
        Style::default()
            .fg(self.status_bar.text)
            .bg(self.status_bar.bg)
    }

    pub fn error_style(&self) -> Style {
        Style::default().fg(self.palette.highlight)
    }
}

fn has_256_color() -> bool {
    supports_color::on(Stream::Stdout).is_some_and(|support| support.has_256)
}
