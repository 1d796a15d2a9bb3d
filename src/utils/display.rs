//! Terminal output helpers for the interactive update prompt.

use owo_colors::OwoColorize;
use std::io::{self, IsTerminal};
use std::sync::OnceLock;
use terminal_size::terminal_size;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

/// Terminal information with cached size and capabilities.
#[derive(Debug, Clone)]
pub struct Terminal {
    width: usize,
    is_tty: bool,
}

static TERMINAL_INFO: OnceLock<Terminal> = OnceLock::new();

/// Get the global terminal information, initialized on first call.
pub fn terminal_info() -> &'static Terminal {
    TERMINAL_INFO.get_or_init(|| {
        let width = terminal_size()
            .map(|(w, _)| w.0 as usize)
            .unwrap_or(DEFAULT_WIDTH);

        Terminal {
            width,
            is_tty: io::stdout().is_terminal(),
        }
    })
}

/// Default width when terminal size cannot be determined.
pub const DEFAULT_WIDTH: usize = 100;

/// Widest a single diff column is allowed to grow.
pub const MAX_COLUMN_WIDTH: usize = 80;

const SEPARATOR: &str = "  ->  ";

#[inline]
pub fn terminal_width() -> usize {
    terminal_info().width
}

#[inline]
pub fn is_terminal() -> bool {
    terminal_info().is_tty
}

/// Display width of `text` in terminal cells.
pub fn display_width(text: &str) -> usize {
    UnicodeWidthStr::width(text)
}

/// Truncate text to fit within `max_width` cells, appending `...` when cut.
pub fn truncate_with_ellipsis(text: &str, max_width: usize) -> String {
    if max_width == 0 {
        return String::new();
    }
    if display_width(text) <= max_width {
        return text.to_string();
    }

    let budget = max_width.saturating_sub(3);
    let mut current = 0;
    let mut truncated = String::new();
    for c in text.chars() {
        let w = UnicodeWidthChar::width(c).unwrap_or(1);
        if current + w > budget {
            break;
        }
        current += w;
        truncated.push(c);
    }
    format!("{}...", truncated.trim_end())
}

/// Pad text with spaces to exactly `width` cells (no-op if already wider).
pub fn pad_to_width(text: &str, width: usize) -> String {
    let w = display_width(text);
    if w >= width {
        text.to_string()
    } else {
        format!("{}{}", text, " ".repeat(width - w))
    }
}

/// Width of one diff column for a terminal `terminal_width` cells wide
pub fn column_width(terminal_width: usize) -> usize {
    (terminal_width / 2).saturating_sub(3).clamp(10, MAX_COLUMN_WIDTH)
}

/// Render two texts side by side, line by line, as `old  ->  new`.
///
/// Lines are truncated to `width` cells. The shorter text is padded with
/// blank lines. With `color` set, lines that differ are highlighted.
pub fn side_by_side(left: &str, right: &str, width: usize, color: bool) -> String {
    let left_lines: Vec<&str> = left.lines().collect();
    let right_lines: Vec<&str> = right.lines().collect();
    let rows = left_lines.len().max(right_lines.len());
    let rule = "-".repeat(width * 2 + SEPARATOR.len() - 1);

    let mut out = String::new();
    out.push_str(&rule);
    out.push('\n');
    for i in 0..rows {
        let l = truncate_with_ellipsis(left_lines.get(i).copied().unwrap_or(""), width);
        let r = truncate_with_ellipsis(right_lines.get(i).copied().unwrap_or(""), width);
        let l = pad_to_width(&l, width);
        let r = pad_to_width(&r, width);
        let changed = left_lines.get(i) != right_lines.get(i);
        if color && changed {
            out.push_str(&format!("{}{}{}", l.red(), SEPARATOR, r.green()));
        } else {
            out.push_str(&format!("{}{}{}", l, SEPARATOR, r));
        }
        out.push('\n');
    }
    out.push_str(&rule);
    out
}
