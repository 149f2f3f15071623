// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Utility functions for idlegate

/// Masks sensitive data (tokens, session ids) for display.
///
/// Shows the first `visible_prefix` characters followed by "..." to allow
/// identification without exposing the full value.
///
/// # Examples
///
/// ```
/// use idlegate::utils::mask_sensitive;
///
/// let token = "sess-9f8e7d6c5b4a39281706f5e4d3c2b1a0";
/// assert_eq!(mask_sensitive(token, 8), "sess-9f8...");
/// ```
pub fn mask_sensitive(input: &str, visible_prefix: usize) -> String {
    if input.chars().count() > visible_prefix {
        let prefix: String = input.chars().take(visible_prefix).collect();
        format!("{}...", prefix)
    } else {
        // Short values are masked entirely to avoid leaking length information
        "...".to_string()
    }
}

/// Formats a number of seconds as a `M:SS` clock string.
///
/// Used by the status line and the warning dialog countdown.
///
/// # Examples
///
/// ```
/// use idlegate::utils::format_clock;
///
/// assert_eq!(format_clock(90), "1:30");
/// assert_eq!(format_clock(5), "0:05");
/// ```
pub fn format_clock(secs: u64) -> String {
    let mins = secs / 60;
    let secs = secs % 60;
    format!("{}:{:02}", mins, secs)
}
