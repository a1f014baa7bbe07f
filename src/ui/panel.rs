use std::collections::HashSet;
use std::path::{Path, PathBuf};

use ratatui::{
    layout::Rect,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame,
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use super::theme::Theme;
use crate::error::ListError;
use crate::services::lister::{self, Entry, EntryKind, SizeState};
use crate::services::size_cache::SizeUpdate;
use crate::utils::format::{format_size, pad_to_display_width, truncate_to_display_width};

pub const PARENT_ROW: &str = "..";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionSummary {
    pub count: usize,
    pub total: Option<u64>,
}

/// One browsable directory view. Navigation commits only after a successful
/// listing, so a failed move leaves the panel where it was.
pub struct PanelState {
    pub path: PathBuf,
    pub entries: Vec<Entry>,
    pub selected_index: usize,
    pub marked: HashSet<String>,
    pub scroll_offset: usize,
}

impl PanelState {
    pub fn new(path: PathBuf) -> Self {
        let fallback = dirs::home_dir().unwrap_or_else(|| PathBuf::from("/"));
        let mut state = Self {
            path: PathBuf::new(),
            entries: Vec::new(),
            selected_index: 0,
            marked: HashSet::new(),
            scroll_offset: 0,
        };
        if state.navigate_to(path).is_err() {
            // Settings may point at a directory that no longer exists
            let _ = state.navigate_to(fallback);
        }
        state
    }

    fn list_with_parent(path: &Path) -> Result<Vec<Entry>, ListError> {
        let mut entries = lister::list(path)?;
        if path.parent().is_some() {
            entries.insert(0, Entry::parent_row());
        }
        Ok(entries)
    }

    /// Switch the panel to `target`. On failure the current listing is kept.
    pub fn navigate_to(&mut self, target: PathBuf) -> Result<(), ListError> {
        let entries = Self::list_with_parent(&target)?;
        self.path = target;
        self.entries = entries;
        self.selected_index = 0;
        self.scroll_offset = 0;
        self.marked.clear();
        Ok(())
    }

    /// Open the entry under the cursor if it is a directory.
    /// Returns true when the panel changed directory.
    pub fn enter_selected(&mut self) -> Result<bool, ListError> {
        let Some(entry) = self.current_entry() else {
            return Ok(false);
        };
        if entry.name == PARENT_ROW {
            return self.navigate_up().map(|()| true);
        }
        if !entry.is_dir() {
            return Ok(false);
        }
        let target = self.path.join(&entry.name);
        self.navigate_to(target)?;
        Ok(true)
    }

    pub fn navigate_up(&mut self) -> Result<(), ListError> {
        match self.path.parent() {
            Some(parent) => self.navigate_to(parent.to_path_buf()),
            None => Ok(()),
        }
    }

    /// Re-list the current directory, keeping the cursor on the same entry
    /// when it still exists. Marks are re-validated against the new listing.
    pub fn reload(&mut self) -> Result<(), ListError> {
        let entries = Self::list_with_parent(&self.path)?;
        let focus = self.current_entry().map(|e| e.name.clone());
        self.marked.retain(|name| entries.iter().any(|e| &e.name == name));
        self.entries = entries;
        self.selected_index = focus
            .and_then(|name| self.entries.iter().position(|e| e.name == name))
            .unwrap_or_else(|| {
                self.selected_index
                    .min(self.entries.len().saturating_sub(1))
            });
        Ok(())
    }

    pub fn current_entry(&self) -> Option<&Entry> {
        self.entries.get(self.selected_index)
    }

    pub fn move_cursor(&mut self, delta: i32) {
        let max = self.entries.len().saturating_sub(1) as i32;
        self.selected_index = (self.selected_index as i32 + delta).clamp(0, max.max(0)) as usize;
    }

    pub fn cursor_to_start(&mut self) {
        self.selected_index = 0;
    }

    pub fn cursor_to_end(&mut self) {
        self.selected_index = self.entries.len().saturating_sub(1);
    }

    /// Toggle the mark on the cursor entry. The parent row cannot be marked.
    pub fn toggle_mark(&mut self) {
        let Some(entry) = self.current_entry() else {
            return;
        };
        if entry.name != PARENT_ROW {
            let name = entry.name.clone();
            if !self.marked.remove(&name) {
                self.marked.insert(name);
            }
        }
    }

    /// Absolute paths to operate on: the marked set, or the cursor entry
    /// when nothing is marked. Sorted for a stable command line.
    pub fn operation_paths(&self) -> Vec<PathBuf> {
        if !self.marked.is_empty() {
            let mut names: Vec<_> = self.marked.iter().cloned().collect();
            names.sort();
            return names.into_iter().map(|n| self.path.join(n)).collect();
        }
        match self.current_entry() {
            Some(entry) if entry.name != PARENT_ROW => vec![self.path.join(&entry.name)],
            _ => Vec::new(),
        }
    }

    /// Marked-entry count and combined size. The total is `Some` only when
    /// every marked entry's size is exact: files from the listing,
    /// directories once the aggregator finished without a permission error.
    pub fn selection_summary(&self) -> SelectionSummary {
        let mut count = 0;
        let mut total = Some(0u64);
        for entry in &self.entries {
            if !self.marked.contains(&entry.name) {
                continue;
            }
            count += 1;
            total = match (total, entry.size, entry.size_state) {
                (Some(acc), Some(size), SizeState::Known) => Some(acc + size),
                _ => None,
            };
        }
        SelectionSummary { count, total }
    }

    /// Directories in the current listing whose sizes are still unknown.
    pub fn dirs_needing_size(&self) -> Vec<PathBuf> {
        self.entries
            .iter()
            .filter(|e| e.is_dir() && e.name != PARENT_ROW && e.size_state == SizeState::Unknown)
            .map(|e| self.path.join(&e.name))
            .collect()
    }

    pub fn mark_sizes_calculating(&mut self) {
        for entry in &mut self.entries {
            if entry.is_dir() && entry.name != PARENT_ROW && entry.size_state == SizeState::Unknown
            {
                entry.size_state = SizeState::Calculating;
            }
        }
    }

    /// Fold a finished size computation into the matching row, if any.
    pub fn apply_size_update(&mut self, update: &SizeUpdate) -> bool {
        if update.path.parent() != Some(self.path.as_path()) {
            return false;
        }
        let Some(name) = update.path.file_name() else {
            return false;
        };
        let name = name.to_string_lossy();
        for entry in &mut self.entries {
            if entry.is_dir() && entry.name == name {
                entry.size = Some(update.size);
                entry.size_state = if update.partial {
                    SizeState::Error
                } else {
                    SizeState::Known
                };
                return true;
            }
        }
        false
    }
}

impl Entry {
    fn parent_row() -> Self {
        Self {
            name: PARENT_ROW.to_string(),
            kind: EntryKind::Directory,
            size: None,
            size_state: SizeState::Unknown,
            modified: chrono::Local::now(),
        }
    }
}

const SIZE_COL: usize = 10;
const DATE_COL: usize = 12;

pub fn draw(frame: &mut Frame, panel: &mut PanelState, area: Rect, is_active: bool, theme: &Theme) {
    let inner_width = area.width.saturating_sub(2) as usize;

    let title = format!(" {} ", tail_truncate(&panel.path.display().to_string(), inner_width.saturating_sub(2)));
    let block = Block::default()
        .title(title)
        .title_style(if is_active {
            theme.border_style(true)
        } else {
            theme.normal_style()
        })
        .borders(Borders::ALL)
        .border_style(theme.border_style(is_active));

    let inner = block.inner(area);
    frame.render_widget(block, area);

    if inner.height < 3 || inner.width < 10 {
        return;
    }

    let (name_col, size_col, date_col) = if (inner.width as usize) > SIZE_COL + DATE_COL + 6 {
        (
            inner.width as usize - SIZE_COL - DATE_COL - 2,
            SIZE_COL,
            DATE_COL,
        )
    } else {
        // Very narrow: name only
        (inner.width.saturating_sub(2) as usize, 0, 0)
    };

    // Header row
    let header_style = if is_active {
        Style::default().fg(theme.panel.header_text_active)
    } else {
        Style::default().fg(theme.panel.header_text)
    };
    let mut header = format!(" {}", pad_to_display_width("Name", name_col.saturating_sub(1)));
    if size_col > 0 {
        header.push_str(&format!("{:>size_col$}", "Size"));
        header.push_str(&format!("{:>date_col$}", "Modified"));
    }
    frame.render_widget(
        Paragraph::new(Span::styled(header, header_style)),
        Rect::new(inner.x, inner.y, inner.width, 1),
    );

    // Visible window: keep the cursor in view, otherwise center-lock
    let visible_height = (inner.height - 2) as usize;
    let total = panel.entries.len();
    let start_index = if total <= visible_height {
        0
    } else if panel.selected_index >= panel.scroll_offset
        && panel.selected_index < panel.scroll_offset + visible_height
    {
        panel.scroll_offset.min(total - visible_height)
    } else {
        let half = visible_height / 2;
        panel
            .selected_index
            .saturating_sub(half)
            .min(total - visible_height)
    };
    panel.scroll_offset = start_index;

    for (i, entry) in panel
        .entries
        .iter()
        .skip(start_index)
        .take(visible_height)
        .enumerate()
    {
        let actual_index = start_index + i;
        let is_cursor = actual_index == panel.selected_index && is_active;
        let is_marked = panel.marked.contains(&entry.name);

        let line = entry_line(entry, is_marked, name_col, size_col, date_col, theme);
        let paragraph = if is_cursor {
            let bg = if is_marked {
                theme.panel.marked_text
            } else if entry.is_dir() {
                theme.panel.directory_text
            } else {
                theme.panel.file_text
            };
            Paragraph::new(line).style(Style::default().bg(bg))
        } else {
            Paragraph::new(line)
        };
        frame.render_widget(
            paragraph,
            Rect::new(inner.x, inner.y + 1 + i as u16, inner.width, 1),
        );
    }

    if total > visible_height {
        let scrollbar = Scrollbar::default()
            .orientation(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(total).position(panel.selected_index);
        let scrollbar_area = Rect::new(
            inner.x + inner.width - 1,
            inner.y + 1,
            1,
            visible_height as u16,
        );
        frame.render_stateful_widget(scrollbar, scrollbar_area, &mut scrollbar_state);
    }

    // Footer: counts, total file size, marks
    let dir_count = panel
        .entries
        .iter()
        .filter(|e| e.name != PARENT_ROW && e.is_dir())
        .count();
    let file_count = panel.entries.iter().filter(|e| !e.is_dir()).count();
    let total_size: u64 = panel
        .entries
        .iter()
        .filter(|e| !e.is_dir())
        .filter_map(|e| e.size)
        .sum();

    let number_style = Style::default().fg(theme.panel.directory_text);
    let label_style = theme.dim_style();
    let mut spans = vec![
        Span::styled(format!("{dir_count}"), number_style),
        Span::styled("d ", label_style),
        Span::styled(format!("{file_count}"), number_style),
        Span::styled("f ", label_style),
        Span::styled(format_size(total_size), number_style),
    ];
    let summary = panel.selection_summary();
    if summary.count > 0 {
        spans.push(Span::styled(" | ", label_style));
        spans.push(Span::styled(
            format!("{}", summary.count),
            theme.marked_style(),
        ));
        spans.push(Span::styled("sel ", label_style));
        let total = match summary.total {
            Some(total) => format_size(total),
            None => "...".to_string(),
        };
        spans.push(Span::styled(total, theme.marked_style()));
    }
    frame.render_widget(
        Paragraph::new(Line::from(spans)).alignment(ratatui::layout::Alignment::Center),
        Rect::new(inner.x, inner.y + inner.height - 1, inner.width, 1),
    );
}

fn entry_line(
    entry: &Entry,
    is_marked: bool,
    name_col: usize,
    size_col: usize,
    date_col: usize,
    theme: &Theme,
) -> Line<'static> {
    let marker = if is_marked { '*' } else { ' ' };
    let decorated = match entry.kind {
        EntryKind::Directory => format!("{}/", entry.name),
        EntryKind::Executable => format!("{}*", entry.name),
        EntryKind::File => entry.name.clone(),
    };
    let name = pad_to_display_width(
        &truncate_to_display_width(&decorated, name_col.saturating_sub(1)),
        name_col.saturating_sub(1),
    );

    let name_style = if is_marked {
        theme.marked_style()
    } else {
        match entry.kind {
            EntryKind::Directory => theme.directory_style(),
            EntryKind::Executable => theme.executable_style(),
            EntryKind::File => theme.normal_style(),
        }
    };

    let mut spans = vec![
        Span::styled(marker.to_string(), theme.marked_style()),
        Span::styled(name, name_style),
    ];

    if size_col > 0 {
        let (size_text, size_style) = size_cell(entry, theme);
        spans.push(Span::styled(
            format!("{size_text:>size_col$}"),
            size_style,
        ));
        let date_text = if entry.name == PARENT_ROW {
            String::new()
        } else {
            entry.modified.format("%m-%d %H:%M").to_string()
        };
        spans.push(Span::styled(
            format!("{date_text:>date_col$}"),
            theme.dim_style(),
        ));
    }

    Line::from(spans)
}

/// Size column text for one row. Directory sizes go through the aggregator,
/// so they surface as pending, exact, or lower-bound values.
fn size_cell(entry: &Entry, theme: &Theme) -> (String, Style) {
    if entry.name == PARENT_ROW {
        return (String::new(), theme.dim_style());
    }
    match entry.size_state {
        SizeState::Unknown if entry.is_dir() => ("?".to_string(), theme.dim_style()),
        SizeState::Calculating => ("...".to_string(), Style::default().fg(theme.panel.size_pending)),
        SizeState::Error => (
            format!("{}+", format_size(entry.size.unwrap_or(0))),
            theme.error_style(),
        ),
        _ => (
            format_size(entry.size.unwrap_or(0)),
            theme.normal_style(),
        ),
    }
}

/// Keep the tail of a long path, prefixing with "..." to fit `width`.
fn tail_truncate(text: &str, width: usize) -> String {
    if text.width() <= width {
        return text.to_string();
    }
    let target = width.saturating_sub(3);
    let mut taken = 0;
    let mut chars: Vec<char> = Vec::new();
    for c in text.chars().rev() {
        let cw = c.width().unwrap_or(1);
        if taken + cw > target {
            break;
        }
        taken += cw;
        chars.push(c);
    }
    chars.reverse();
    format!("...{}", chars.into_iter().collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};

    fn make_tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::create_dir(dir.path().join("music")).unwrap();
        File::create(dir.path().join("readme.txt")).unwrap();
        File::create(dir.path().join("notes.md")).unwrap();
        dir
    }

    #[test]
    fn test_new_panel_lists_with_parent_row() {
        let dir = make_tree();
        let panel = PanelState::new(dir.path().to_path_buf());
        assert_eq!(panel.entries[0].name, PARENT_ROW);
        assert_eq!(panel.entries[1].name, "docs");
        assert_eq!(panel.entries[2].name, "music");
        assert_eq!(panel.entries[3].name, "notes.md");
        assert_eq!(panel.entries[4].name, "readme.txt");
    }

    #[test]
    fn test_new_panel_falls_back_for_missing_path() {
        let dir = make_tree();
        let gone = dir.path().join("nothing-here");
        let panel = PanelState::new(gone.clone());
        assert_ne!(panel.path, gone);
        assert!(!panel.entries.is_empty());
    }

    #[test]
    fn test_enter_and_navigate_up() {
        let dir = make_tree();
        let mut panel = PanelState::new(dir.path().to_path_buf());
        panel.selected_index = 1; // docs
        assert!(panel.enter_selected().unwrap());
        assert_eq!(panel.path, dir.path().join("docs"));
        assert_eq!(panel.selected_index, 0);

        panel.navigate_up().unwrap();
        assert_eq!(panel.path, dir.path());
        assert_eq!(panel.selected_index, 0);
    }

    #[test]
    fn test_enter_on_file_is_a_no_op() {
        let dir = make_tree();
        let mut panel = PanelState::new(dir.path().to_path_buf());
        panel.selected_index = 4; // readme.txt
        assert!(!panel.enter_selected().unwrap());
        assert_eq!(panel.path, dir.path());
    }

    #[test]
    fn test_failed_navigation_keeps_listing() {
        let dir = make_tree();
        let mut panel = PanelState::new(dir.path().to_path_buf());
        panel.selected_index = 2;
        let before = panel.entries.len();

        let err = panel.navigate_to(dir.path().join("missing"));
        assert!(err.is_err());
        assert_eq!(panel.path, dir.path());
        assert_eq!(panel.entries.len(), before);
        assert_eq!(panel.selected_index, 2);
    }

    #[test]
    fn test_toggle_mark_skips_parent_and_round_trips() {
        let dir = make_tree();
        let mut panel = PanelState::new(dir.path().to_path_buf());

        panel.toggle_mark(); // on "..": never marked
        assert!(panel.marked.is_empty());

        panel.selected_index = 1;
        panel.toggle_mark();
        assert!(panel.marked.contains("docs"));
        panel.toggle_mark();
        assert!(panel.marked.is_empty());
    }

    #[test]
    fn test_operation_paths_prefers_marks_over_cursor() {
        let dir = make_tree();
        let mut panel = PanelState::new(dir.path().to_path_buf());
        panel.selected_index = 4;
        assert_eq!(panel.operation_paths(), vec![dir.path().join("readme.txt")]);

        panel.marked.insert("music".to_string());
        panel.marked.insert("docs".to_string());
        assert_eq!(
            panel.operation_paths(),
            vec![dir.path().join("docs"), dir.path().join("music")]
        );
    }

    #[test]
    fn test_selection_summary_totals_only_known_sizes() {
        let dir = make_tree();
        fs::write(dir.path().join("readme.txt"), vec![0u8; 10]).unwrap();
        fs::write(dir.path().join("notes.md"), vec![0u8; 5]).unwrap();
        let mut panel = PanelState::new(dir.path().to_path_buf());

        panel.marked.insert("readme.txt".to_string());
        panel.marked.insert("notes.md".to_string());
        assert_eq!(
            panel.selection_summary(),
            SelectionSummary {
                count: 2,
                total: Some(15)
            }
        );

        // An unsized directory makes the total unknown
        panel.marked.insert("docs".to_string());
        let summary = panel.selection_summary();
        assert_eq!(summary.count, 3);
        assert_eq!(summary.total, None);

        // Once the aggregator reports, the total firms back up
        panel.apply_size_update(&SizeUpdate {
            path: dir.path().join("docs"),
            size: 100,
            partial: false,
        });
        assert_eq!(panel.selection_summary().total, Some(115));
    }

    #[test]
    fn test_reload_keeps_cursor_on_surviving_entry() {
        let dir = make_tree();
        let mut panel = PanelState::new(dir.path().to_path_buf());
        panel.selected_index = 3; // notes.md
        fs::remove_file(dir.path().join("readme.txt")).unwrap();

        panel.reload().unwrap();
        assert_eq!(panel.current_entry().unwrap().name, "notes.md");
    }

    #[test]
    fn test_reload_clamps_cursor_when_entry_vanishes() {
        let dir = make_tree();
        let mut panel = PanelState::new(dir.path().to_path_buf());
        panel.cursor_to_end(); // readme.txt
        fs::remove_file(dir.path().join("readme.txt")).unwrap();

        panel.reload().unwrap();
        assert!(panel.selected_index < panel.entries.len());
    }

    #[test]
    fn test_apply_size_update_targets_matching_row() {
        let dir = make_tree();
        let mut panel = PanelState::new(dir.path().to_path_buf());

        let applied = panel.apply_size_update(&SizeUpdate {
            path: dir.path().join("docs"),
            size: 4096,
            partial: false,
        });
        assert!(applied);
        let entry = panel.entries.iter().find(|e| e.name == "docs").unwrap();
        assert_eq!(entry.size, Some(4096));
        assert_eq!(entry.size_state, SizeState::Known);

        // Updates for other directories do not touch this panel
        let foreign = panel.apply_size_update(&SizeUpdate {
            path: PathBuf::from("/somewhere/else"),
            size: 1,
            partial: false,
        });
        assert!(!foreign);
    }

    #[test]
    fn test_dirs_needing_size_excludes_files_and_parent() {
        let dir = make_tree();
        let mut panel = PanelState::new(dir.path().to_path_buf());
        assert_eq!(
            panel.dirs_needing_size(),
            vec![dir.path().join("docs"), dir.path().join("music")]
        );

        panel.mark_sizes_calculating();
        assert!(panel.dirs_needing_size().is_empty());
    }

    #[test]
    fn test_tail_truncate() {
        assert_eq!(tail_truncate("/short", 20), "/short");
        assert_eq!(tail_truncate("/very/long/path/tail", 10), "...th/tail");
    }
}
