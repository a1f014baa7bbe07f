use std::collections::VecDeque;

/// Scrollback buffer for external tool output. Follows the tail until the
/// operator scrolls up with PgUp; PgDn back to the bottom resumes following.
pub struct OutputBuffer {
    lines: VecDeque<String>,
    capacity: usize,
    // Lines scrolled up from the bottom; 0 means following the tail
    offset: usize,
}

impl OutputBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity.min(256)),
            capacity,
            offset: 0,
        }
    }

    pub fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
        // A scrolled-up view stays anchored to the same lines
        if self.offset > 0 {
            self.offset = (self.offset + 1).min(self.lines.len().saturating_sub(1));
        }
    }

    pub fn extend<I: IntoIterator<Item = String>>(&mut self, lines: I) {
        for line in lines {
            self.push(line);
        }
    }

    pub fn clear(&mut self) {
        self.lines.clear();
        self.offset = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_following(&self) -> bool {
        self.offset == 0
    }

    pub fn page_up(&mut self, page: usize) {
        self.offset = (self.offset + page).min(self.max_offset(page));
    }

    pub fn page_down(&mut self, page: usize) {
        self.offset = self.offset.saturating_sub(page);
    }

    fn max_offset(&self, page: usize) -> usize {
        self.lines.len().saturating_sub(page)
    }

    /// The window of lines to render for a pane of `height` rows.
    pub fn visible(&self, height: usize) -> impl Iterator<Item = &str> {
        let end = self.lines.len().saturating_sub(self.offset);
        let start = end.saturating_sub(height);
        self.lines.range(start..end).map(String::as_str)
    }
}
