// Copyright (c) 2024-2025 Jesse Morgan / Morgan Forge
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Session audit logging
//!
//! Append-only log of session lifecycle events (armed, warning, sign-out)
//! kept at `~/.idlegate/session.log`. Lines are plain text, one event per
//! line, so the trail survives crashes and can be read with standard tools.
//!
//! Log format:
//! `2024-01-15 10:23:45 |         MONITOR_SIGNED_OUT | reason=idle_timeout route=/dashboard | user=jmorgan | host=lawbox`
//!
//! Details are redacted before they are written: bearer tokens, passwords
//! and credential-looking assignments never reach disk.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, LazyLock, OnceLock, RwLock};

/// Maximum length of the detail field in a log line
const MAX_DETAIL_LENGTH: usize = 120;

/// Maximum number of entries kept in memory for quick access
const RECENT_BUFFER_MAX: usize = 1_000;

/// Redaction patterns for sensitive data
/// JUSTIFICATION for .expect(): These are static, compile-time-validated regex patterns.
/// If any of these fail to compile, it's a programmer error that should be caught in testing.
/// This initialization happens once at startup, not while events are being logged.
static REDACTION_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    vec![
        (
            Regex::new(r"(?i)bearer\s+[A-Za-z0-9_\-\.=]+").expect("bearer regex is valid"),
            "Bearer [REDACTED]",
        ),
        (
            Regex::new(r#"(?i)password["']?\s*[:=]\s*\S+"#).expect("password regex is valid"),
            "password=[REDACTED]",
        ),
        (
            Regex::new(r#"(?i)token["']?\s*[:=]\s*\S+"#).expect("token regex is valid"),
            "token=[REDACTED]",
        ),
        (
            Regex::new(r"(?i)authorization:\s*\S+").expect("authorization regex is valid"),
            "authorization: [REDACTED]",
        ),
    ]
});

/// Strip credential-looking material from a string.
pub fn redact_secrets(input: &str) -> String {
    let mut result = input.to_string();
    for (pattern, replacement) in REDACTION_PATTERNS.iter() {
        result = pattern.replace_all(&result, *replacement).to_string();
    }
    result
}

/// Collapse whitespace and cap the detail to a single readable line.
///
/// The cap counts bytes but the cut always lands on a character boundary,
/// so multi-byte route names and matter titles survive intact.
fn truncate_detail(detail: &str, max_length: usize) -> String {
    let collapsed: String = detail.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() <= max_length {
        return collapsed;
    }
    let mut out = String::with_capacity(max_length + 3);
    for c in collapsed.chars() {
        if out.len() + c.len_utf8() > max_length {
            break;
        }
        out.push(c);
    }
    out.push_str("...");
    out
}

// ============================================================================
// Audit Entries
// ============================================================================

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    /// Event name, e.g. `MONITOR_SIGNED_OUT`
    pub event: String,
    /// Redacted, single-line detail
    pub detail: String,
    /// OS user the client ran as
    pub user: String,
    /// Hostname the client ran on
    pub host: String,
}

impl AuditEntry {
    /// Create an entry, redacting and truncating the detail.
    pub fn new(event: &str, detail: &str) -> Self {
        Self {
            timestamp: Utc::now(),
            event: event.to_string(),
            detail: truncate_detail(&redact_secrets(detail), MAX_DETAIL_LENGTH),
            user: get_username(),
            host: get_hostname(),
        }
    }

    /// Format as a single log line.
    pub fn to_log_line(&self) -> String {
        let local_time = self.timestamp.with_timezone(&chrono::Local);
        format!(
            "{} | {:>26} | {} | user={} | host={}",
            local_time.format("%Y-%m-%d %H:%M:%S"),
            self.event,
            self.detail,
            self.user,
            self.host
        )
    }
}

/// OS user name from the environment, or "unknown".
fn get_username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Machine hostname, or "unknown".
fn get_hostname() -> String {
    hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

// ============================================================================
// Audit Logger
// ============================================================================

/// Appends audit entries to the session log.
pub struct AuditLogger {
    log_file: PathBuf,
    enabled: bool,
    recent_entries: RwLock<Vec<AuditEntry>>,
}

impl AuditLogger {
    /// Create a logger writing to the default location.
    pub fn new(enabled: bool) -> Result<Self> {
        let dir = Self::log_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create audit log directory {}", dir.display()))?;
        Ok(Self {
            log_file: dir.join("session.log"),
            enabled,
            recent_entries: RwLock::new(Vec::new()),
        })
    }

    /// Create a logger writing to an explicit file. Used by tests and by
    /// deployments that keep audit trails on a mounted volume.
    pub fn with_log_file(log_file: PathBuf, enabled: bool) -> Result<Self> {
        if let Some(parent) = log_file.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create audit log directory {}", parent.display())
            })?;
        }
        Ok(Self {
            log_file,
            enabled,
            recent_entries: RwLock::new(Vec::new()),
        })
    }

    /// Directory holding idlegate state (`~/.idlegate`).
    pub fn log_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".idlegate"))
    }

    /// Path of the log file.
    pub fn log_file(&self) -> &PathBuf {
        &self.log_file
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Append an entry to the log.
    pub fn log(&self, entry: AuditEntry) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_file)
            .with_context(|| format!("Failed to open audit log {}", self.log_file.display()))?;
        writeln!(file, "{}", entry.to_log_line())
            .with_context(|| format!("Failed to write audit log {}", self.log_file.display()))?;

        if let Ok(mut recent) = self.recent_entries.write() {
            recent.push(entry);
            if recent.len() > RECENT_BUFFER_MAX {
                let overflow = recent.len() - RECENT_BUFFER_MAX;
                recent.drain(..overflow);
            }
        }

        Ok(())
    }

    /// Convenience: build and append an entry in one call.
    pub fn log_event(&self, event: &str, detail: &str) -> Result<()> {
        self.log(AuditEntry::new(event, detail))
    }

    /// The most recent entries logged by this process, newest last.
    pub fn recent(&self, count: usize) -> Vec<AuditEntry> {
        match self.recent_entries.read() {
            Ok(recent) => {
                let start = recent.len().saturating_sub(count);
                recent[start..].to_vec()
            }
            Err(_) => Vec::new(),
        }
    }

    /// Read every line of the log file, oldest first.
    pub fn read_all_lines(&self) -> Result<Vec<String>> {
        if !self.log_file.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.log_file)
            .with_context(|| format!("Failed to read audit log {}", self.log_file.display()))?;
        Ok(content.lines().map(|l| l.to_string()).collect())
    }

    /// Number of lines in the log file.
    pub fn entry_count(&self) -> usize {
        self.read_all_lines().map(|lines| lines.len()).unwrap_or(0)
    }

    /// Size of the log file in bytes.
    pub fn log_size_bytes(&self) -> u64 {
        fs::metadata(&self.log_file).map(|m| m.len()).unwrap_or(0)
    }

    /// Export the in-memory entries as pretty-printed JSON.
    pub fn export_to_json(&self, path: &PathBuf) -> Result<usize> {
        let recent = self
            .recent_entries
            .read()
            .map_err(|_| anyhow::anyhow!("Audit entry buffer is poisoned"))?;
        let json =
            serde_json::to_string_pretty(&*recent).context("Failed to serialize audit entries")?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write audit export {}", path.display()))?;
        Ok(recent.len())
    }

    /// Delete all logged entries.
    pub fn clear(&self) -> Result<()> {
        if self.log_file.exists() {
            fs::remove_file(&self.log_file)
                .with_context(|| format!("Failed to remove audit log {}", self.log_file.display()))?;
        }
        if let Ok(mut recent) = self.recent_entries.write() {
            recent.clear();
        }
        Ok(())
    }
}

// ============================================================================
// Global Logger
// ============================================================================

static GLOBAL_AUDIT_LOGGER: OnceLock<Arc<RwLock<AuditLogger>>> = OnceLock::new();

/// Access the process-wide audit logger, creating it on first use.
///
/// JUSTIFICATION for .expect(): a logger that cannot even resolve the home
/// directory means the environment is broken beyond what this process can
/// repair; failing fast beats silently dropping an audit trail.
pub fn global_audit_logger() -> &'static Arc<RwLock<AuditLogger>> {
    GLOBAL_AUDIT_LOGGER.get_or_init(|| {
        Arc::new(RwLock::new(
            AuditLogger::new(true).expect("Failed to initialize audit logger"),
        ))
    })
}

/// Initialize the global audit logger with an explicit enabled flag.
///
/// Called once during startup; later calls only adjust the flag.
pub fn init_audit_logger(enabled: bool) -> Result<()> {
    let logger = global_audit_logger();
    if let Ok(mut guard) = logger.write() {
        guard.set_enabled(enabled);
    }
    Ok(())
}

pub fn is_audit_enabled() -> bool {
    global_audit_logger()
        .read()
        .map(|l| l.is_enabled())
        .unwrap_or(false)
}

pub fn set_audit_enabled(enabled: bool) {
    if let Ok(mut guard) = global_audit_logger().write() {
        guard.set_enabled(enabled);
    }
}

/// Append an event through the global logger, never failing the caller.
pub fn audit_event(event: &str, detail: &str) {
    if let Ok(logger) = global_audit_logger().read() {
        if let Err(e) = logger.log_event(event, detail) {
            tracing::debug!("AUDIT_WRITE_FAILED | event={} error={}", event, e);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_redact_bearer_token() {
        let input = "request sent with Bearer tok_9f8e7d6c5b4a.39281706 attached";
        let redacted = redact_secrets(input);
        assert!(redacted.contains("Bearer [REDACTED]"));
        assert!(!redacted.contains("tok_9f8e7d6c5b4a"));
    }

    #[test]
    fn test_redact_password_assignment() {
        let redacted = redact_secrets("login with password=hunter2 failed");
        assert!(redacted.contains("password=[REDACTED]"));
        assert!(!redacted.contains("hunter2"));
    }

    #[test]
    fn test_redact_token_assignment() {
        let redacted = redact_secrets("refresh token: abcdef123456");
        assert!(redacted.contains("token=[REDACTED]"));
        assert!(!redacted.contains("abcdef123456"));
    }

    #[test]
    fn test_redact_leaves_plain_details_alone() {
        let input = "route=/matters/42 countdown=30s";
        assert_eq!(redact_secrets(input), input);
    }

    #[test]
    fn test_truncate_detail_collapses_whitespace() {
        let detail = "route=/dashboard\n\n   countdown=30s";
        assert_eq!(
            truncate_detail(detail, MAX_DETAIL_LENGTH),
            "route=/dashboard countdown=30s"
        );
    }

    #[test]
    fn test_truncate_detail_caps_length() {
        let long = "x".repeat(500);
        let truncated = truncate_detail(&long, MAX_DETAIL_LENGTH);
        assert_eq!(truncated.len(), MAX_DETAIL_LENGTH + 3);
        assert!(truncated.ends_with("..."));
    }

    #[test]
    fn test_truncate_detail_respects_char_boundaries() {
        // "route=/" is 7 bytes, every é is 2, so the byte cap falls inside
        // a character; the cut must back off to the previous boundary
        let detail = format!("route=/{}", "é".repeat(80));
        let truncated = truncate_detail(&detail, MAX_DETAIL_LENGTH);
        assert_eq!(truncated, format!("route=/{}...", "é".repeat(56)));
        assert!(truncated.len() <= MAX_DETAIL_LENGTH + 3);
    }

    #[test]
    fn test_entry_accepts_multibyte_detail() {
        let long_route = format!("route=/matters/{}", "déposition-évidence".repeat(10));
        let entry = AuditEntry::new("SESSION_STARTED", &long_route);
        assert!(entry.detail.ends_with("..."));
        assert!(entry.to_log_line().contains("SESSION_STARTED"));
    }

    #[test]
    fn test_entry_log_line_format() {
        let entry = AuditEntry::new("MONITOR_SIGNED_OUT", "reason=idle_timeout route=/dashboard");
        let line = entry.to_log_line();
        assert!(line.contains("MONITOR_SIGNED_OUT"));
        assert!(line.contains("reason=idle_timeout"));
        assert!(line.contains("user="));
        assert!(line.contains("host="));
    }

    #[test]
    fn test_logger_appends_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::with_log_file(dir.path().join("session.log"), true).unwrap();

        logger.log_event("MONITOR_ARMED", "timeout=3600s").unwrap();
        logger.log_event("MONITOR_WARNING", "countdown=30s").unwrap();

        let lines = logger.read_all_lines().unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("MONITOR_ARMED"));
        assert!(lines[1].contains("MONITOR_WARNING"));
        assert_eq!(logger.entry_count(), 2);
        assert!(logger.log_size_bytes() > 0);
    }

    #[test]
    fn test_disabled_logger_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::with_log_file(dir.path().join("session.log"), false).unwrap();

        logger.log_event("MONITOR_ARMED", "timeout=3600s").unwrap();
        assert_eq!(logger.entry_count(), 0);
        assert!(!logger.log_file().exists());
    }

    #[test]
    fn test_logger_redacts_before_writing() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::with_log_file(dir.path().join("session.log"), true).unwrap();

        logger
            .log_event(
                "AUTH_SIGNED_OUT",
                "sent Bearer tok_super_secret_12345 to endpoint",
            )
            .unwrap();
        let lines = logger.read_all_lines().unwrap();
        assert!(lines[0].contains("Bearer [REDACTED]"));
        assert!(!lines[0].contains("tok_super_secret_12345"));
    }

    #[test]
    fn test_recent_returns_newest_entries() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::with_log_file(dir.path().join("session.log"), true).unwrap();

        for i in 0..5 {
            logger
                .log_event("MONITOR_ACTIVITY", &format!("kind=key n={}", i))
                .unwrap();
        }
        let recent = logger.recent(2);
        assert_eq!(recent.len(), 2);
        assert!(recent[0].detail.contains("n=3"));
        assert!(recent[1].detail.contains("n=4"));
    }

    #[test]
    fn test_clear_removes_log() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::with_log_file(dir.path().join("session.log"), true).unwrap();

        logger.log_event("MONITOR_ARMED", "timeout=3600s").unwrap();
        assert_eq!(logger.entry_count(), 1);

        logger.clear().unwrap();
        assert_eq!(logger.entry_count(), 0);
        assert!(logger.recent(10).is_empty());
    }

    #[test]
    fn test_export_to_json() {
        let dir = TempDir::new().unwrap();
        let logger = AuditLogger::with_log_file(dir.path().join("session.log"), true).unwrap();

        logger.log_event("MONITOR_ARMED", "timeout=3600s").unwrap();
        let export = dir.path().join("export.json");
        let count = logger.export_to_json(&export).unwrap();
        assert_eq!(count, 1);

        let json = std::fs::read_to_string(&export).unwrap();
        assert!(json.contains("MONITOR_ARMED"));
    }
}
