use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Format a byte count as a human-readable size with one decimal place.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    for unit in UNITS {
        if value < 1024.0 {
            return format!("{:.1} {}", value, unit);
        }
        value /= 1024.0;
    }
    format!("{:.1} PB", value)
}

/// Truncate a string to at most `max_width` display columns.
pub fn truncate_to_display_width(s: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut out = String::new();
    for c in s.chars() {
        let cw = c.width().unwrap_or(1);
        if width + cw > max_width {
            break;
        }
        width += cw;
        out.push(c);
    }
    out
}

/// Pad a string with spaces to exactly `width` display columns,
/// truncating first if it is too long.
pub fn pad_to_display_width(s: &str, width: usize) -> String {
    let truncated = if s.width() > width {
        truncate_to_display_width(s, width)
    } else {
        s.to_string()
    };
    let padding = width.saturating_sub(truncated.width());
    format!("{}{}", truncated, " ".repeat(padding))
}
