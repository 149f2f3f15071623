// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Warning dialog and status line rendering
//!
//! Presentation for the inactivity monitor: a one-line session status and a
//! boxed countdown warning. Rendering returns plain strings; the caller
//! decides where to print them, so the same renderers serve the interactive
//! harness and the tests.
//!
//! Three dialog styles:
//! - **overlay**: drawn over the top rows of the terminal with cursor
//!   save/restore, for clients that keep their own screen contents
//! - **inline**: printed into the normal output flow
//! - **off**: nothing rendered; countdown still governs the session

use colored::Colorize;
use serde::{Deserialize, Serialize};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::monitor::MonitorState;
use crate::utils::format_clock;

// ANSI escape sequences for overlay positioning
const SAVE_CURSOR: &str = "\x1b[s";
const RESTORE_CURSOR: &str = "\x1b[u";
const CLEAR_LINE: &str = "\x1b[2K";

/// Total width of the warning box in columns.
const DIALOG_WIDTH: usize = 46;

/// Rows occupied by the overlay dialog, starting at row 1.
const DIALOG_ROWS: usize = 7;

// ============================================================================
// Dialog Styles
// ============================================================================

/// How the countdown warning is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DialogStyle {
    /// Drawn over the top rows of the terminal, restoring the cursor after
    Overlay,
    /// Printed into the normal output flow
    #[default]
    Inline,
    /// No dialog at all; the countdown still ends the session
    Off,
}

impl DialogStyle {
    /// Parse from a config or CLI string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "overlay" => Some(DialogStyle::Overlay),
            "inline" => Some(DialogStyle::Inline),
            "off" | "none" | "hidden" => Some(DialogStyle::Off),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialogStyle::Overlay => "overlay",
            DialogStyle::Inline => "inline",
            DialogStyle::Off => "off",
        }
    }

    /// Cycle to the next style.
    pub fn next(&self) -> Self {
        match self {
            DialogStyle::Overlay => DialogStyle::Inline,
            DialogStyle::Inline => DialogStyle::Off,
            DialogStyle::Off => DialogStyle::Overlay,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DialogStyle::Overlay => "Overlay - warning box drawn over the top of the screen",
            DialogStyle::Inline => "Inline - warning box printed with normal output",
            DialogStyle::Off => "Off - no visible warning",
        }
    }
}

impl std::fmt::Display for DialogStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Width Helpers
// ============================================================================

/// Display width of a string after stripping ANSI color codes.
fn visible_width(s: &str) -> usize {
    let stripped = strip_ansi_escapes::strip(s);
    String::from_utf8_lossy(&stripped).width()
}

/// Truncate a (possibly colored) line to fit the terminal, appending "..."
/// when it had to be cut.
///
/// Color escape sequences occupy zero columns: they pass through whole and
/// never count toward the width, so the cut cannot land inside one. SGR
/// sequences end at an ASCII letter.
fn truncate_to_width(s: &str, max_width: usize) -> String {
    if visible_width(s) <= max_width {
        return s.to_string();
    }
    let budget = max_width.saturating_sub(3);
    let mut out = String::new();
    let mut width = 0;
    let mut in_escape = false;
    for c in s.chars() {
        if in_escape {
            out.push(c);
            if c.is_ascii_alphabetic() {
                in_escape = false;
            }
            continue;
        }
        if c == '\x1b' {
            out.push(c);
            in_escape = true;
            continue;
        }
        let char_width = c.width().unwrap_or(0);
        if width + char_width > budget {
            break;
        }
        out.push(c);
        width += char_width;
    }
    if out.contains('\x1b') {
        // Close any open color span so the dots render plain
        out.push_str("\x1b[0m");
    }
    format!("{}...", out)
}

/// Current terminal width, defaulting to 80 columns.
fn terminal_width() -> usize {
    crossterm::terminal::size()
        .map(|(w, _)| w as usize)
        .unwrap_or(80)
}

// ============================================================================
// Warning Dialog
// ============================================================================

/// Render the countdown warning, or `None` when the style suppresses it.
pub fn render_warning_dialog(seconds_remaining: u64, style: DialogStyle) -> Option<String> {
    match style {
        DialogStyle::Off => None,
        DialogStyle::Inline => Some(warning_box(seconds_remaining)),
        DialogStyle::Overlay => {
            let mut out = String::from(SAVE_CURSOR);
            for (i, line) in warning_box(seconds_remaining).lines().enumerate() {
                out.push_str(&format!("\x1b[{};1H{}{}", i + 1, CLEAR_LINE, line));
            }
            out.push_str(RESTORE_CURSOR);
            Some(out)
        }
    }
}

/// Render the sequence that erases an overlay dialog. Inline and off styles
/// leave nothing behind to erase.
pub fn clear_warning_dialog(style: DialogStyle) -> Option<String> {
    match style {
        DialogStyle::Overlay => {
            let mut out = String::from(SAVE_CURSOR);
            for row in 1..=DIALOG_ROWS {
                out.push_str(&format!("\x1b[{};1H{}", row, CLEAR_LINE));
            }
            out.push_str(RESTORE_CURSOR);
            Some(out)
        }
        DialogStyle::Inline | DialogStyle::Off => None,
    }
}

fn warning_box(seconds_remaining: u64) -> String {
    let inner = DIALOG_WIDTH - 4;
    let clock = if seconds_remaining <= 10 {
        format_clock(seconds_remaining).red().bold().to_string()
    } else {
        format_clock(seconds_remaining).yellow().bold().to_string()
    };

    let top = format!("\u{250C}{}\u{2510}", "\u{2500}".repeat(DIALOG_WIDTH - 2));
    let bottom = format!("\u{2514}{}\u{2518}", "\u{2500}".repeat(DIALOG_WIDTH - 2));

    let lines = [
        format!("{}", "\u{26A0}  Session expiring soon".yellow().bold()),
        String::new(),
        format!("You will be signed out in {}", clock),
        String::new(),
        format!("Press {} to stay signed in", "Enter".bold()),
        format!("{}", "Press q to sign out now".bright_black()),
    ];

    let mut out = String::new();
    out.push_str(&top);
    out.push('\n');
    for line in &lines {
        out.push_str(&boxed_line(line, inner));
        out.push('\n');
    }
    out.push_str(&bottom);
    out
}

fn boxed_line(content: &str, inner_width: usize) -> String {
    let pad = inner_width.saturating_sub(visible_width(content));
    format!("\u{2502} {}{} \u{2502}", content, " ".repeat(pad))
}

// ============================================================================
// Status Line
// ============================================================================

/// Render the one-line session status for the bottom of the screen.
///
/// `window_remaining_secs` is the time left in the full inactivity window,
/// tracked by the caller from its own last-activity clock.
pub fn render_status_line(state: MonitorState, window_remaining_secs: u64) -> String {
    let line = match state {
        MonitorState::Armed => {
            let clock = format_clock(window_remaining_secs);
            let colored_clock = if window_remaining_secs < 120 {
                clock.red().bold().to_string()
            } else if window_remaining_secs < 300 {
                clock.yellow().to_string()
            } else {
                clock.bright_black().to_string()
            };
            format!(
                "{} session {} remaining",
                "\u{25CF}".bright_green(),
                colored_clock
            )
        }
        MonitorState::Warning => format!(
            "{} signing out in {}",
            "\u{25B2}".yellow().bold(),
            format_clock(window_remaining_secs).yellow().bold()
        ),
        MonitorState::SignedOut => format!("{} signed out", "\u{2717}".red().bold()),
        MonitorState::Disarmed => format!("{} no session", "\u{25CB}".bright_black()),
    };
    truncate_to_width(&line, terminal_width().saturating_sub(1))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn plain(s: &str) -> String {
        String::from_utf8_lossy(&strip_ansi_escapes::strip(s)).to_string()
    }

    #[test]
    fn test_dialog_style_from_str() {
        assert_eq!(DialogStyle::from_str("overlay"), Some(DialogStyle::Overlay));
        assert_eq!(DialogStyle::from_str("Inline"), Some(DialogStyle::Inline));
        assert_eq!(DialogStyle::from_str("off"), Some(DialogStyle::Off));
        assert_eq!(DialogStyle::from_str("none"), Some(DialogStyle::Off));
        assert_eq!(DialogStyle::from_str("hidden"), Some(DialogStyle::Off));
        assert_eq!(DialogStyle::from_str("bogus"), None);
    }

    #[test]
    fn test_dialog_style_next_cycles() {
        let start = DialogStyle::Overlay;
        assert_eq!(start.next(), DialogStyle::Inline);
        assert_eq!(start.next().next(), DialogStyle::Off);
        assert_eq!(start.next().next().next(), DialogStyle::Overlay);
    }

    #[test]
    fn test_dialog_style_default_and_description() {
        assert_eq!(DialogStyle::default(), DialogStyle::Inline);
        for style in [DialogStyle::Overlay, DialogStyle::Inline, DialogStyle::Off] {
            assert!(!style.description().is_empty());
            assert_eq!(DialogStyle::from_str(style.as_str()), Some(style));
        }
    }

    #[test]
    fn test_inline_dialog_contains_countdown() {
        let dialog = render_warning_dialog(27, DialogStyle::Inline).unwrap();
        let text = plain(&dialog);
        assert!(text.contains("0:27"));
        assert!(text.contains("Session expiring soon"));
        assert!(text.contains("stay signed in"));
        assert!(text.contains('\u{250C}'));
        assert!(text.contains('\u{2518}'));
    }

    #[test]
    fn test_off_style_renders_nothing() {
        assert!(render_warning_dialog(27, DialogStyle::Off).is_none());
        assert!(clear_warning_dialog(DialogStyle::Off).is_none());
    }

    #[test]
    fn test_overlay_saves_and_restores_cursor() {
        let dialog = render_warning_dialog(5, DialogStyle::Overlay).unwrap();
        assert!(dialog.starts_with(SAVE_CURSOR));
        assert!(dialog.ends_with(RESTORE_CURSOR));

        let clear = clear_warning_dialog(DialogStyle::Overlay).unwrap();
        assert!(clear.contains(CLEAR_LINE));
    }

    #[test]
    fn test_box_lines_align() {
        let dialog = render_warning_dialog(9, DialogStyle::Inline).unwrap();
        for line in plain(&dialog).lines() {
            assert_eq!(line.width(), DIALOG_WIDTH, "misaligned line: {:?}", line);
        }
    }

    #[test]
    fn test_status_line_variants() {
        assert!(plain(&render_status_line(MonitorState::Armed, 3600)).contains("session"));
        assert!(plain(&render_status_line(MonitorState::Warning, 15)).contains("signing out in 0:15"));
        assert!(plain(&render_status_line(MonitorState::SignedOut, 0)).contains("signed out"));
        assert!(plain(&render_status_line(MonitorState::Disarmed, 0)).contains("no session"));
    }

    #[test]
    fn test_truncate_to_width() {
        assert_eq!(truncate_to_width("short", 20), "short");
        let long = "x".repeat(40);
        let truncated = truncate_to_width(&long, 20);
        assert!(truncated.ends_with("..."));
        assert!(visible_width(&truncated) <= 20);
    }

    #[test]
    fn test_truncate_to_width_skips_color_codes() {
        // Escape payload is zero columns; a colored line that fits by
        // visible width passes through untouched
        let short = "\x1b[31mdeadline\x1b[0m soon";
        assert_eq!(truncate_to_width(short, 20), short);

        // A cut line keeps its sequences whole, fills the full visible
        // budget, and closes the color before the dots
        let long = format!("\x1b[33m{}\x1b[0m", "x".repeat(40));
        let cut = truncate_to_width(&long, 20);
        assert!(cut.ends_with("\x1b[0m..."));
        assert!(cut.starts_with("\x1b[33m"));
        assert_eq!(visible_width(&cut), 20);
    }

    #[test]
    fn test_visible_width_ignores_color_codes() {
        let colored_str = "hello".red().bold().to_string();
        assert_eq!(visible_width(&colored_str), 5);
    }
}
