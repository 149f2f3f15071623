// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! User-facing failure reports.
//!
//! Interactive commands end on a short structured block: what failed, what
//! likely caused it, and what to try next. The report also carries the exit
//! code the process should end with, so a call site hands the whole outcome
//! to [`FailureReport::exit`] in one expression instead of pairing an
//! `eprintln!` with a separate `process::exit`.

use std::fmt;

/// GitHub issues URL for support.
pub const GITHUB_ISSUES_URL: &str = "https://github.com/idlegate/idlegate/issues";

/// A user-facing failure: title, likely causes, suggested fixes, and the
/// exit code to end the process with.
///
/// # Example
///
/// ```
/// use idlegate::error::FailureReport;
///
/// let report = FailureReport::new("Could not write the audit log")
///     .cause("Home directory is not writable")
///     .fix("Check permissions on ~/.idlegate")
///     .fix("Disable the audit trail: idlegate config set audit_log false")
///     .exit_code(74);
/// eprintln!("{}", report);
/// ```
#[derive(Debug)]
pub struct FailureReport {
    title: String,
    causes: Vec<String>,
    fixes: Vec<String>,
    exit_code: i32,
}

impl FailureReport {
    /// New report with the given title and a generic failure exit code.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            causes: Vec::new(),
            fixes: Vec::new(),
            exit_code: 1,
        }
    }

    /// Add a likely cause.
    pub fn cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a suggested fix, ideally a runnable command.
    pub fn fix(mut self, fix: impl Into<String>) -> Self {
        self.fixes.push(fix.into());
        self
    }

    /// Set the exit code the process should end with.
    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// The exit code this report carries.
    pub fn code(&self) -> i32 {
        self.exit_code
    }

    /// Render the report block.
    pub fn render(&self) -> String {
        use fmt::Write as _;

        let mut out = format!("✗ {}\n", self.title);
        if !self.causes.is_empty() {
            out.push_str("\nLikely causes:\n");
            for cause in &self.causes {
                let _ = writeln!(out, "  - {}", cause);
            }
        }
        if !self.fixes.is_empty() {
            out.push_str("\nWhat to try:\n");
            for (n, fix) in self.fixes.iter().enumerate() {
                let _ = writeln!(out, "  {}. {}", n + 1, fix);
            }
        }
        let _ = write!(out, "\nStill stuck? {}", GITHUB_ISSUES_URL);
        out
    }

    /// Print the report to stderr and end the process with its exit code.
    pub fn exit(self) -> ! {
        eprintln!("{}", self.render());
        std::process::exit(self.exit_code)
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Build a [`FailureReport`] in one expression.
///
/// Causes and fixes are both optional; either list may be omitted entirely.
///
/// # Examples
///
/// ```
/// use idlegate::failure;
///
/// let report = failure!(
///     "Sign-out endpoint unreachable",
///     causes: ["The case-management API is down", "Wrong URL configured"],
///     fixes: [
///         "Check the endpoint: idlegate config show",
///         "Fix it: idlegate config set sign_out_endpoint <url>",
///     ]
/// );
/// eprintln!("{}", report);
/// ```
#[macro_export]
macro_rules! failure {
    ($title:expr $(, causes: [$($cause:expr),* $(,)?])? $(, fixes: [$($fix:expr),* $(,)?])? $(,)?) => {{
        let report = $crate::error::FailureReport::new($title);
        $(let report = report $(.cause($cause))*;)?
        $(let report = report $(.fix($fix))*;)?
        report
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_report_renders_all_sections() {
        let rendered = FailureReport::new("Sign-out endpoint unreachable")
            .cause("API is down")
            .cause("Wrong URL")
            .fix("Check the URL")
            .fix("Clear the endpoint")
            .render();

        assert!(rendered.starts_with("✗ Sign-out endpoint unreachable\n"));
        assert!(rendered.contains("Likely causes:\n  - API is down\n  - Wrong URL"));
        assert!(rendered.contains("What to try:\n  1. Check the URL\n  2. Clear the endpoint"));
        assert!(rendered.ends_with(&format!("Still stuck? {}", GITHUB_ISSUES_URL)));
    }

    #[test]
    fn test_bare_report_skips_empty_sections() {
        let rendered = FailureReport::new("Watch mode needs a terminal").render();
        assert!(rendered.contains("✗ Watch mode needs a terminal"));
        assert!(!rendered.contains("Likely causes:"));
        assert!(!rendered.contains("What to try:"));
        assert!(rendered.contains(GITHUB_ISSUES_URL));
    }

    #[test]
    fn test_display_matches_render() {
        let report = FailureReport::new("Display test").cause("Cause").fix("Fix");
        assert_eq!(format!("{}", report), report.render());
    }

    #[test]
    fn test_exit_code_defaults_and_overrides() {
        assert_eq!(FailureReport::new("plain").code(), 1);
        assert_eq!(FailureReport::new("io").exit_code(74).code(), 74);
    }

    #[test]
    fn test_macro_builds_every_shape() {
        let bare = failure!("Title only");
        assert!(!bare.render().contains("Likely causes:"));

        let causes_only = failure!("With causes", causes: ["one", "two"]);
        assert!(causes_only.render().contains("  - two"));
        assert!(!causes_only.render().contains("What to try:"));

        let fixes_only = failure!("With fixes", fixes: ["first", "second"]);
        assert!(fixes_only.render().contains("  2. second"));
        assert!(!fixes_only.render().contains("Likely causes:"));

        let both = failure!(
            "Everything",
            causes: ["a cause"],
            fixes: ["a fix"],
        );
        let rendered = both.render();
        assert!(rendered.contains("  - a cause"));
        assert!(rendered.contains("  1. a fix"));
    }
}
