use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};
use unicode_width::UnicodeWidthStr;

use super::app::{App, PanelSide};
use super::panel;
use super::theme::Theme;
use crate::services::transfer::{JobState, OutputMode, RunMode, TransferMode};
use crate::utils::format::format_size;

pub const OUTPUT_PANE_HEIGHT: u16 = 10;

pub fn draw(frame: &mut Frame, app: &mut App) {
    let theme = app.theme;
    let show_output = app.attached.is_some() || !app.output.is_empty();

    let constraints = if show_output {
        vec![
            Constraint::Min(5),
            Constraint::Length(OUTPUT_PANE_HEIGHT),
            Constraint::Length(1),
            Constraint::Length(1),
        ]
    } else {
        vec![
            Constraint::Min(5),
            Constraint::Length(1),
            Constraint::Length(1),
        ]
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.area());

    let panel_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(chunks[0]);

    let blocked = app.is_blocked();
    let active = app.active_panel;
    panel::draw(
        frame,
        &mut app.left_panel,
        panel_chunks[0],
        active == PanelSide::Left && !blocked,
        &theme,
    );
    panel::draw(
        frame,
        &mut app.right_panel,
        panel_chunks[1],
        active == PanelSide::Right && !blocked,
        &theme,
    );

    let (status_area, legend_area) = if show_output {
        draw_output_pane(frame, app, chunks[1], &theme);
        (chunks[2], chunks[3])
    } else {
        (chunks[1], chunks[2])
    };

    draw_status_bar(frame, app, status_area, &theme);
    draw_legend(frame, app, legend_area, &theme);
}

fn draw_output_pane(frame: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let title = match &app.attached {
        Some(job) => format!(" {} ", job.request.mode.label()),
        None => " Output ".to_string(),
    };
    let block = Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(theme.output.border));
    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height == 0 {
        return;
    }

    // Progress summary claims the first row while an attached job reports
    let mut text_area = inner;
    if let Some(job) = &app.attached {
        if job.request.output_mode == OutputMode::Progress && job.state == JobState::Running {
            let progress = &job.progress;
            let mut parts = Vec::new();
            if let Some(percent) = progress.percent {
                parts.push(format!("{percent}%"));
            }
            if progress.transferred > 0 {
                match progress.total {
                    Some(total) => parts.push(format!(
                        "{} / {}",
                        format_size(progress.transferred),
                        format_size(total)
                    )),
                    None => parts.push(format_size(progress.transferred)),
                }
            }
            if let Some(file) = &progress.current_file {
                parts.push(file.clone());
            }
            let line = if parts.is_empty() {
                "starting...".to_string()
            } else {
                parts.join("  ")
            };
            frame.render_widget(
                Paragraph::new(Span::styled(
                    line,
                    Style::default()
                        .fg(theme.output.progress)
                        .add_modifier(Modifier::BOLD),
                )),
                Rect::new(inner.x, inner.y, inner.width, 1),
            );
            text_area = Rect::new(
                inner.x,
                inner.y + 1,
                inner.width,
                inner.height.saturating_sub(1),
            );
        }
    }

    let height = text_area.height as usize;
    let text_style = Style::default().fg(theme.output.text);
    for (i, line) in app.output.visible(height).enumerate() {
        frame.render_widget(
            Paragraph::new(Span::styled(line.to_string(), text_style)),
            Rect::new(text_area.x, text_area.y + i as u16, text_area.width, 1),
        );
    }
}

fn draw_status_bar(frame: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    let panel = app.active_panel();
    let mut left_text = match panel.current_entry() {
        Some(entry) if entry.name != panel::PARENT_ROW => match entry.size {
            Some(size) => format!("{} ({})", entry.name, format_size(size)),
            None => entry.name.clone(),
        },
        _ => String::new(),
    };
    let summary = panel.selection_summary();
    if summary.count > 0 {
        let total = match summary.total {
            Some(total) => format_size(total),
            None => "...".to_string(),
        };
        left_text.push_str(&format!("  [{} selected, {}]", summary.count, total));
    }

    let mode_span = |label: &str, on: bool| {
        Span::styled(
            format!(" {label} "),
            Style::default()
                .fg(if on {
                    theme.status_bar.mode_on
                } else {
                    theme.status_bar.mode_off
                })
                .bg(theme.status_bar.bg),
        )
    };

    let modes = [
        (TransferMode::Copy.label(), app.transfer_mode == TransferMode::Copy),
        (TransferMode::Move.label(), app.transfer_mode == TransferMode::Move),
        (RunMode::Attached.label(), app.run_mode == RunMode::Attached),
        (RunMode::Detached.label(), app.run_mode == RunMode::Detached),
        (OutputMode::Progress.label(), app.output_mode == OutputMode::Progress),
        (OutputMode::Log.label(), app.output_mode == OutputMode::Log),
    ];
    let right_width: usize = modes.iter().map(|(l, _)| l.width() + 2).sum();

    let padding = (area.width as usize)
        .saturating_sub(left_text.width() + right_width + 2);

    let mut spans = vec![
        Span::styled(format!(" {left_text} "), theme.status_bar_style()),
        Span::styled(" ".repeat(padding), theme.status_bar_style()),
    ];
    for (label, on) in modes {
        spans.push(mode_span(label, on));
    }

    frame.render_widget(
        Paragraph::new(Line::from(spans)).style(theme.status_bar_style()),
        area,
    );
}

fn draw_legend(frame: &mut Frame, app: &App, area: Rect, theme: &Theme) {
    if let Some(msg) = &app.message {
        let message = Paragraph::new(Span::styled(
            format!(" {msg} "),
            Style::default()
                .fg(theme.message.text)
                .add_modifier(Modifier::BOLD),
        ));
        frame.render_widget(message, area);
        return;
    }

    let items: &[(&str, &str)] = if app.is_blocked() {
        &[("Esc", "cancel "), ("PgUp/PgDn", "scroll ")]
    } else {
        &[
            ("↑↓", "nav "),
            ("Tab", "panel "),
            ("Enter", "open "),
            ("Bksp", "up "),
            ("Space", "sel "),
            ("c", "copy "),
            ("m", "move "),
            ("a", "att "),
            ("d", "det "),
            ("p", "prog "),
            ("l", "log "),
            ("r", "run "),
            ("PgUp/PgDn", "scroll "),
            ("q", "quit"),
        ]
    };

    let key_style = Style::default().fg(theme.legend.key);
    let label_style = Style::default().fg(theme.legend.label);
    let mut spans = Vec::new();
    for (key, label) in items {
        spans.push(Span::styled(*key, key_style));
        spans.push(Span::styled(":", label_style));
        spans.push(Span::styled(*label, label_style));
    }

    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}
